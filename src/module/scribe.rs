//! Posts the lines of a randomly chosen file, spelled out.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::info;

use super::{Module, Schedule};
use crate::config::ScribeConfig;
use crate::engine::Outbox;
use crate::error::ModuleError;

pub struct Scribe {
    channel: String,
    datapath: PathBuf,
    schedule: Schedule,
}

impl Scribe {
    pub fn new(channel: String, datapath: PathBuf, schedule: Schedule) -> Self {
        Self {
            channel,
            datapath,
            schedule,
        }
    }

    pub fn from_config(cfg: &ScribeConfig, now: DateTime<Utc>) -> Self {
        Self::new(
            cfg.channel.clone(),
            cfg.datapath.clone(),
            Schedule::every(cfg.interval, now),
        )
    }
}

async fn data_files(dir: &Path) -> Result<Vec<PathBuf>, ModuleError> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Shuffle the non-empty lines of `text` and render each as a batch of
/// message bodies: one per character (1 in 3), otherwise a single body with
/// the characters separated by spaces.
pub fn compose<R: Rng>(text: &str, rng: &mut R) -> Vec<Vec<String>> {
    let mut lines: Vec<&str> = text
        .split('\n')
        .map(|l| l.trim_end_matches('\r'))
        .filter(|l| !l.is_empty())
        .collect();
    lines.shuffle(&mut *rng);

    lines
        .into_iter()
        .map(|line| {
            if rng.gen_range(0..3) == 0 {
                line.chars().map(String::from).collect()
            } else {
                let spaced: Vec<String> = line.chars().map(String::from).collect();
                vec![spaced.join(" ")]
            }
        })
        .collect()
}

#[async_trait]
impl Module for Scribe {
    fn name(&self) -> &str {
        "scribe"
    }

    fn should_run(&mut self, now: DateTime<Utc>) -> bool {
        self.schedule.due(now)
    }

    async fn execute(&mut self, now: DateTime<Utc>, outbox: &Outbox) -> Result<(), ModuleError> {
        self.schedule.record_run(now);
        info!("scribe module executing");

        let files = data_files(&self.datapath).await?;
        let chosen = files
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or_else(|| ModuleError::EmptyDataPath(self.datapath.clone()))?;
        info!(file = %chosen.display(), "scribe reading");

        let text = tokio::fs::read_to_string(&chosen).await?;
        let batches = compose(&text, &mut rand::thread_rng());
        for body in batches.iter().flatten() {
            outbox.privmsg(&self.channel, body).await?;
        }
        Ok(())
    }
}
