//! Inbound line handling.

use tracing::{debug, info, warn};

use super::{Engine, Meta, Phase};
use crate::casemap::irc_eq;
use crate::module::CommandContext;
use crate::response::Response;
use crate::sasl::{authenticate_lines, encode_plain, AUTHENTICATE_PLAIN, CAP_END};
use crate::source::Source;

const CTCP_DELIM: char = '\x01';

impl Engine {
    /// Handle one inbound line, then any follow-up transition it produced.
    pub(crate) async fn process_line(&mut self, line: &str) {
        debug!(line = %line, "irc_input");
        if let Some(next) = self.handle_line(line).await {
            self.process_meta(next).await;
        }
    }

    async fn handle_line(&mut self, line: &str) -> Option<Meta> {
        let args: Vec<&str> = line.split(' ').collect();
        if args.len() < 2 {
            debug!(line = %line, "ignoring input with insufficient arguments");
            return None;
        }

        match args[0] {
            "PING" => {
                self.send(line.replacen("PING", "PONG", 1)).await;
                return None;
            }
            "AUTHENTICATE" => {
                if args[1] == "+" {
                    self.send_sasl_payload().await;
                }
                return None;
            }
            _ => {}
        }

        let source = if args[0].starts_with(':') {
            match Source::parse(args[0]) {
                Ok(source) => Some(source),
                Err(e) => {
                    warn!(error = %e, "error parsing source");
                    return None;
                }
            }
        } else {
            None
        };

        match args[1] {
            "JOIN" => self.handle_join(source.as_ref(), &args),
            "KICK" => self.handle_kick(&args),
            "PRIVMSG" => {
                if let Some(source) = &source {
                    self.handle_privmsg(source, &args).await;
                }
            }
            "CAP" => return self.handle_cap(&args).await,
            code => {
                if let Ok(response) = code.parse::<Response>() {
                    return self.handle_numeric(response);
                }
            }
        }
        None
    }

    async fn send_sasl_payload(&mut self) {
        let Some(creds) = &self.identity.sasl else {
            warn!("server requested SASL payload but no credentials are configured");
            return;
        };
        info!(username = %creds.username, "sending SASL PLAIN credentials");
        let lines = authenticate_lines(&encode_plain(creds));
        for line in lines {
            self.send(line).await;
        }
        self.send(CAP_END).await;
    }

    /// `CAP <target> ACK|NAK :<caps>`
    async fn handle_cap(&mut self, args: &[&str]) -> Option<Meta> {
        if args.len() < 5 || self.state.phase() != Phase::SaslNegotiating {
            return None;
        }
        let mut caps = args[4..].iter().map(|c| c.trim_start_matches(':'));
        if !caps.any(|c| c.eq_ignore_ascii_case("sasl")) {
            return None;
        }

        match args[3] {
            "ACK" => {
                info!("server acknowledged sasl capability");
                self.send(AUTHENTICATE_PLAIN).await;
                None
            }
            "NAK" => {
                warn!("server refused sasl capability, registering without it");
                self.send(CAP_END).await;
                Some(Meta::NickRegister)
            }
            _ => None,
        }
    }

    fn handle_numeric(&mut self, response: Response) -> Option<Meta> {
        match response {
            Response::RPL_WELCOME => {
                info!(nick = %self.identity.nick, "registered");
                self.state.set_phase(Phase::Registered);
                None
            }
            Response::RPL_SASLSUCCESS | Response::ERR_SASLALREADY
                if self.state.phase() == Phase::SaslNegotiating =>
            {
                info!("SASL authentication complete");
                Some(Meta::NickRegister)
            }
            r if r.is_sasl_failure() && self.state.phase() == Phase::SaslNegotiating => {
                warn!(numeric = %r, "SASL authentication failed, registering without it");
                Some(Meta::NickRegister)
            }
            _ => None,
        }
    }

    fn handle_join(&mut self, source: Option<&Source>, args: &[&str]) {
        let Some(source) = source else { return };
        if args.len() < 3 || !source.is_me(&self.identity.nick) {
            return;
        }
        let channel = args[2].trim_start_matches(':');
        if !self.state.mark_joined(channel, true) {
            debug!(channel = %channel, "joined unmanaged channel");
            return;
        }
        info!(channel = %channel, "joined channel");

        for module in self.state.modules.iter_mut() {
            if module.should_run_on_join(channel) {
                info!(module = module.name(), channel = %channel, "module due after join");
            }
        }
    }

    /// `:<src> KICK <channel> <nick> [:reason]`
    fn handle_kick(&mut self, args: &[&str]) {
        if args.len() < 4 || !irc_eq(args[3], &self.identity.nick) {
            return;
        }
        if self.state.mark_joined(args[2], false) {
            warn!(channel = %args[2], "kicked from channel");
        }
    }

    async fn handle_privmsg(&mut self, source: &Source, args: &[&str]) {
        if args.len() < 4 {
            return;
        }
        let target = args[2];
        let text = args[3..].join(" ");
        let text = text.strip_prefix(':').unwrap_or(&text);

        if irc_eq(target, &self.identity.nick) && self.answer_ctcp(source, text).await {
            return;
        }

        let mut words = text.split(' ');
        let Some(token) = words.next().filter(|t| !t.is_empty()) else {
            return;
        };
        let rest: Vec<&str> = words.collect();
        let cmd = CommandContext {
            source,
            target,
            token,
            args: &rest,
        };

        for module in self.state.modules.iter_mut() {
            if !module.handles_command(token) {
                continue;
            }
            debug!(module = module.name(), token, "routing command");
            if let Err(e) = module.handle_command(&cmd, &self.outbox).await {
                warn!(module = module.name(), error = %e, "error in command handler");
            }
        }
    }

    /// Reply to CTCP PING and VERSION. Returns `true` if `text` was one.
    async fn answer_ctcp(&mut self, source: &Source, text: &str) -> bool {
        let Some(nick) = source.nick() else {
            return false;
        };
        let (body, framed) = match text.strip_prefix(CTCP_DELIM) {
            Some(inner) => (inner.strip_suffix(CTCP_DELIM).unwrap_or(inner), true),
            None => (text, false),
        };

        let reply = match body.split(' ').next() {
            Some("PING") => body.to_owned(),
            Some("VERSION") => format!("VERSION kraz {}", env!("CARGO_PKG_VERSION")),
            _ => return false,
        };
        info!(from = %source, query = %body, "answering CTCP");

        let reply = if framed {
            format!("{}{}{}", CTCP_DELIM, reply, CTCP_DELIM)
        } else {
            reply
        };
        if let Err(e) = self.outbox.notice(nick, &reply).await {
            warn!(error = %e, "dropping CTCP reply");
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{links, Identity, Outbox, SupervisorLinks};
    use crate::error::ModuleError;
    use crate::sasl::Credentials;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::{Arc, Mutex};
    use tokio::sync::{mpsc, oneshot};

    #[derive(Default)]
    struct Seen {
        joins: Vec<String>,
        commands: Vec<(String, Vec<String>, String)>,
    }

    struct Recorder(Arc<Mutex<Seen>>);

    #[async_trait]
    impl crate::module::Module for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn should_run(&mut self, _now: DateTime<Utc>) -> bool {
            false
        }

        fn should_run_on_join(&mut self, channel: &str) -> bool {
            self.0.lock().unwrap().joins.push(channel.to_owned());
            true
        }

        async fn execute(&mut self, _now: DateTime<Utc>, _outbox: &Outbox) -> Result<(), ModuleError> {
            Ok(())
        }

        fn handles_command(&self, token: &str) -> bool {
            token == "&echo"
        }

        async fn handle_command(
            &mut self,
            cmd: &CommandContext<'_>,
            outbox: &Outbox,
        ) -> Result<(), ModuleError> {
            let args = cmd.args.iter().map(|a| a.to_string()).collect();
            self.0.lock().unwrap().commands.push((
                cmd.token.to_owned(),
                args,
                cmd.reply_target().to_owned(),
            ));
            outbox.privmsg(cmd.reply_target(), "echo").await?;
            Ok(())
        }
    }

    struct Fixture {
        engine: Engine,
        sup: SupervisorLinks,
        seen: Arc<Mutex<Seen>>,
        _exit: oneshot::Receiver<()>,
    }

    impl Fixture {
        fn sent(&mut self) -> Vec<String> {
            let mut out = Vec::new();
            while let Ok(line) = self.sup.outbound.try_recv() {
                out.push(line);
            }
            out
        }
    }

    async fn connected(sasl: Option<Credentials>) -> Fixture {
        let (eng, sup) = links();
        let seen = Arc::new(Mutex::new(Seen::default()));
        let mut engine = Engine::new(
            Identity {
                nick: "kraz".to_owned(),
                sasl,
            },
            vec!["#stocks".to_owned(), "#other".to_owned()],
            vec![Box::new(Recorder(seen.clone()))],
            eng,
        );
        let (tx, exit) = oneshot::channel();
        engine.process_meta(Meta::Register { writer_exit: tx }).await;
        let mut fx = Fixture {
            engine,
            sup,
            seen,
            _exit: exit,
        };
        fx.sent();
        fx
    }

    async fn registered() -> Fixture {
        let mut fx = connected(None).await;
        fx.engine.process_line(":irc.example.net 001 kraz :Welcome").await;
        fx
    }

    #[tokio::test]
    async fn test_ping_pong() {
        let mut fx = connected(None).await;
        fx.engine.process_line("PING :irc.example.net").await;
        assert_eq!(fx.sent(), vec!["PONG :irc.example.net"]);
    }

    #[tokio::test]
    async fn test_short_and_malformed_lines_ignored() {
        let mut fx = connected(None).await;
        fx.engine.process_line("NOTICE").await;
        fx.engine.process_line("").await;
        fx.engine.process_line(":nick!identhost PRIVMSG kraz :\x01VERSION\x01").await;
        assert!(fx.sent().is_empty());
    }

    #[tokio::test]
    async fn test_sasl_success_flow() {
        let mut fx = connected(Some(Credentials::new("u", "p"))).await;
        fx.engine.process_line(":irc.example.net CAP * ACK :sasl").await;
        assert_eq!(fx.sent(), vec!["AUTHENTICATE PLAIN"]);

        fx.engine.process_line("AUTHENTICATE +").await;
        assert_eq!(fx.sent(), vec!["AUTHENTICATE dQB1AHA=", "CAP END"]);

        fx.engine.process_line(":irc.example.net 903 kraz :SASL authentication successful").await;
        assert_eq!(fx.sent(), vec!["NICK kraz", "USER kraz @ host :kraz"]);
        assert_eq!(fx.engine.state().phase(), Phase::Registering);

        fx.engine.process_line(":irc.example.net 001 kraz :Welcome").await;
        assert!(fx.engine.state().registered());
    }

    #[tokio::test]
    async fn test_sasl_failure_falls_back_once() {
        let mut fx = connected(Some(Credentials::new("u", "bad"))).await;
        fx.engine.process_line(":irc.example.net 904 kraz :SASL authentication failed").await;
        assert_eq!(fx.sent(), vec!["NICK kraz", "USER kraz @ host :kraz"]);

        fx.engine.process_line(":irc.example.net 906 kraz :SASL authentication aborted").await;
        assert!(fx.sent().is_empty());
    }

    #[tokio::test]
    async fn test_sasl_nak_ends_negotiation() {
        let mut fx = connected(Some(Credentials::new("u", "p"))).await;
        fx.engine.process_line(":irc.example.net CAP * NAK :sasl").await;
        assert_eq!(fx.sent(), vec!["CAP END", "NICK kraz", "USER kraz @ host :kraz"]);
    }

    #[tokio::test]
    async fn test_join_and_kick_bookkeeping() {
        let mut fx = registered().await;
        fx.engine.process_line(":Kraz!k@host JOIN :#Stocks").await;
        assert!(fx.engine.state().channel("#stocks").unwrap().joined);
        assert_eq!(fx.seen.lock().unwrap().joins, vec!["#Stocks"]);

        fx.engine.process_line(":alice!a@host JOIN #other").await;
        assert!(!fx.engine.state().channel("#other").unwrap().joined);

        fx.engine.process_line(":op!o@host KICK #stocks alice :bye").await;
        assert!(fx.engine.state().channel("#stocks").unwrap().joined);

        fx.engine.process_line(":op!o@host KICK #stocks KRAZ :bye").await;
        assert!(!fx.engine.state().channel("#stocks").unwrap().joined);
    }

    #[tokio::test]
    async fn test_ctcp_replies() {
        let mut fx = registered().await;
        fx.engine.process_line(":alice!a@host PRIVMSG kraz :\x01PING 12345\x01").await;
        fx.engine.process_line(":alice!a@host PRIVMSG kraz :VERSION").await;
        fx.engine.process_line(":alice!a@host PRIVMSG #stocks :\x01VERSION\x01").await;
        assert_eq!(
            fx.sent(),
            vec![
                "NOTICE alice :\x01PING 12345\x01".to_owned(),
                format!("NOTICE alice :VERSION kraz {}", env!("CARGO_PKG_VERSION")),
            ]
        );
    }

    #[tokio::test]
    async fn test_command_routing() {
        let mut fx = registered().await;
        fx.engine.process_line(":alice!a@host PRIVMSG #stocks :&echo one two").await;
        fx.engine.process_line(":alice!a@host PRIVMSG kraz :&echo").await;
        fx.engine.process_line(":alice!a@host PRIVMSG #stocks :&other").await;

        assert_eq!(fx.sent(), vec!["PRIVMSG #stocks :echo", "PRIVMSG alice :echo"]);
        let seen = fx.seen.lock().unwrap();
        assert_eq!(
            seen.commands,
            vec![
                (
                    "&echo".to_owned(),
                    vec!["one".to_owned(), "two".to_owned()],
                    "#stocks".to_owned()
                ),
                ("&echo".to_owned(), vec![], "alice".to_owned()),
            ]
        );
    }

    #[tokio::test]
    async fn test_closed_outbound_is_not_fatal() {
        let mut fx = registered().await;
        let (_, detached) = mpsc::channel(1);
        drop(std::mem::replace(&mut fx.sup.outbound, detached));
        fx.engine.process_line("PING :x").await;
        fx.engine.process_line(":alice!a@host PRIVMSG #stocks :&echo").await;
        assert_eq!(fx.seen.lock().unwrap().commands.len(), 1);
    }
}
