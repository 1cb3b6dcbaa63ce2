//! `glint send` — split, encode, and pace a file out as symbol records.

use std::collections::VecDeque;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use glint_core::block::split_blocks;
use glint_core::config::{GlintConfig, PolicyKind, SendMode};
use glint_core::recovery::ResendRequest;
use glint_core::wire::{file_tag, WireFormat};
use glint_core::SymbolEncoder;
use glint_services::{LineSink, SchedulerError, SendState, SenderScheduler};

use super::flag_value;

#[derive(Debug, Default, PartialEq)]
pub struct SendArgs {
    pub file: PathBuf,
    pub fps: Option<u32>,
    pub policy: Option<PolicyKind>,
    pub format: Option<WireFormat>,
    pub surfaces: Option<usize>,
    pub looping: bool,
    pub resend: Option<ResendRequest>,
    pub hold: bool,
}

impl SendArgs {
    pub fn parse(args: &[String]) -> Result<Self> {
        let mut parsed = SendArgs::default();
        let mut file = None;
        let mut i = 0;
        while i < args.len() {
            match args[i].as_str() {
                "--fps" => {
                    parsed.fps = Some(
                        flag_value(args, &mut i)?
                            .parse()
                            .context("--fps must be a number")?,
                    )
                }
                "--policy" => parsed.policy = Some(flag_value(args, &mut i)?.parse()?),
                "--format" => parsed.format = Some(flag_value(args, &mut i)?.parse()?),
                "--surfaces" => {
                    parsed.surfaces = Some(
                        flag_value(args, &mut i)?
                            .parse()
                            .context("--surfaces must be a number")?,
                    )
                }
                "--resend" => {
                    parsed.resend = Some(
                        ResendRequest::parse(flag_value(args, &mut i)?)
                            .context("--resend needs a list such as \"1, 3, 5\"")?,
                    )
                }
                "--loop" => parsed.looping = true,
                "--hold" => parsed.hold = true,
                flag if flag.starts_with("--") => bail!("unknown option: {flag}"),
                path => {
                    if file.replace(PathBuf::from(path)).is_some() {
                        bail!("only one file can be sent at a time");
                    }
                }
            }
            i += 1;
        }
        parsed.file = file.context("no file given")?;
        if parsed.looping && parsed.resend.is_some() {
            // A looping pass never ends, so later resend batches would never start.
            bail!("--resend cannot be combined with --loop");
        }
        Ok(parsed)
    }

    fn apply(&self, config: &mut GlintConfig) {
        if let Some(fps) = self.fps {
            config.sender.fps = fps;
        }
        if let Some(policy) = self.policy {
            config.transfer.policy = policy;
        }
        if let Some(format) = self.format {
            config.transfer.wire_format = format;
        }
        if let Some(surfaces) = self.surfaces {
            config.sender.surfaces = surfaces;
        }
        if self.looping {
            config.sender.mode = SendMode::Looping;
        }
    }
}

pub async fn run(mut config: GlintConfig, args: SendArgs) -> Result<()> {
    args.apply(&mut config);
    config.validate().context("invalid send options")?;

    let scheduler = prepare(&config, &args.file).await?;
    if scheduler.symbol_count() == 0 {
        bail!("{} is empty, nothing to send", args.file.display());
    }

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    {
        let shutdown_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupted");
                let _ = shutdown_tx.send(());
            }
        });
    }
    {
        // A plain thread: a blocked stdin read must not keep the runtime alive.
        let scheduler = scheduler.clone();
        std::thread::spawn(move || operator_controls(&scheduler));
    }

    let sink = Arc::new(LineSink::stdout());
    let mut sender = tokio::spawn(scheduler.clone().run(sink, shutdown_tx.subscribe()));

    let pending: VecDeque<Vec<u32>> = match &args.resend {
        Some(request) => request.batches().map(<[u32]>::to_vec).collect(),
        None => VecDeque::new(),
    };
    if drive(&scheduler, pending, args.hold, &mut sender).await? == Drive::SenderStopped {
        return Ok(());
    }

    let _ = shutdown_tx.send(());
    sender.await.context("sender task panicked")??;
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum Drive {
    ListComplete,
    SenderStopped,
}

/// Start the full list, or each resend batch in turn, and wait for the
/// last one to go out. With `hold` this only returns once the sender task
/// itself stops.
async fn drive(
    scheduler: &SenderScheduler,
    mut pending: VecDeque<Vec<u32>>,
    hold: bool,
    sender: &mut JoinHandle<Result<(), SchedulerError>>,
) -> Result<Drive> {
    let mut progress = scheduler.subscribe();
    scheduler.start(pending.pop_front())?;

    loop {
        tokio::select! {
            result = &mut *sender => {
                result.context("sender task panicked")?.context("sender stopped")?;
                return Ok(Drive::SenderStopped);
            }
            changed = progress.changed() => {
                if changed.is_err() {
                    return Ok(Drive::ListComplete);
                }
                let snapshot = progress.borrow_and_update().clone();
                if snapshot.state != SendState::Idle || snapshot.last_index.is_none() {
                    continue;
                }
                if let Some(batch) = pending.pop_front() {
                    tracing::info!(
                        indices = batch.len(),
                        remaining = pending.len(),
                        "next resend batch"
                    );
                    scheduler.start(Some(batch))?;
                } else if !hold {
                    tracing::info!(sent = snapshot.sent, "send list complete");
                    return Ok(Drive::ListComplete);
                }
            }
        }
    }
}

/// Read, split, and encode `file` into an idle scheduler.
async fn prepare(config: &GlintConfig, file: &Path) -> Result<SenderScheduler> {
    let data = tokio::fs::read(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
    let name = file
        .file_name()
        .and_then(|n| n.to_str())
        .context("file name is not valid UTF-8")?;

    let format = config.transfer.wire_format;
    let tag = file_tag(name, format);
    let blocks = split_blocks(&data, config.transfer.block_size);
    let encoder = SymbolEncoder::new(config.transfer.encoding_policy());
    let symbols = encoder.encode(&blocks, &tag);

    tracing::info!(
        file = %file.display(),
        bytes = data.len(),
        blocks = blocks.len(),
        symbols = symbols.len(),
        policy = ?encoder.policy(),
        ?format,
        fps = config.sender.fps,
        "prepared transfer"
    );

    Ok(SenderScheduler::new(&symbols, format, &config.sender)?)
}

/// Apply operator commands typed on stdin until it closes.
fn operator_controls(scheduler: &SenderScheduler) {
    for line in std::io::stdin().lock().lines() {
        match line {
            Ok(line) => {
                if let Err(e) = apply_command(scheduler, &line) {
                    tracing::warn!(command = %line.trim(), error = %e, "operator command failed");
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "operator input closed");
                return;
            }
        }
    }
}

fn apply_command(scheduler: &SenderScheduler, line: &str) -> Result<()> {
    let line = line.trim();
    let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
    match command {
        "" => {}
        "pause" => scheduler.pause(),
        "resume" => scheduler.resume(),
        "start" => scheduler.start(None)?,
        "reset" => scheduler.reset(),
        "fps" => scheduler.set_fps(rest.trim().parse().context("fps needs a number")?)?,
        "resend" => scheduler.resend(&ResendRequest::parse(rest)?)?,
        "status" => {
            let p = scheduler.progress();
            eprintln!(
                "state={:?} sent={} cursor={}/{} last={}",
                p.state,
                p.sent,
                p.cursor,
                p.list_len,
                p.last_index.map(|i| i.to_string()).unwrap_or_else(|| "-".into())
            );
        }
        other => bail!("unknown command: {other}"),
    }
    Ok(())
}
