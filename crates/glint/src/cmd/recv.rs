//! `glint recv` — collect decoded records from capture sources and write
//! the reassembled file.
//!
//! Each source is a file (or stdin) with one decoded record per line, as a
//! scanner would emit them. Lines may carry the sender's `surface<TAB>`
//! prefix. Blank lines are frames with no symbol in view.

use std::io::BufRead;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tokio::sync::mpsc;

use glint_core::config::{CompletionMode, GlintConfig};
use glint_core::recovery::ResendRequest;
use glint_services::{spawn_capture, write_artifact, Receiver, ScanEvent};

use super::flag_value;

#[derive(Debug, Default, PartialEq)]
pub struct RecvArgs {
    pub inputs: Vec<String>,
    pub out: Option<PathBuf>,
    pub completion: Option<CompletionMode>,
    pub ratio: Option<f64>,
}

impl RecvArgs {
    pub fn parse(args: &[String]) -> Result<Self> {
        let mut parsed = RecvArgs::default();
        let mut i = 0;
        while i < args.len() {
            match args[i].as_str() {
                "--out" => parsed.out = Some(PathBuf::from(flag_value(args, &mut i)?)),
                "--completion" => parsed.completion = Some(flag_value(args, &mut i)?.parse()?),
                "--ratio" => {
                    parsed.ratio = Some(
                        flag_value(args, &mut i)?
                            .parse()
                            .context("--ratio must be a number")?,
                    )
                }
                flag if flag.starts_with("--") => bail!("unknown option: {flag}"),
                input => parsed.inputs.push(input.to_string()),
            }
            i += 1;
        }
        if parsed.inputs.is_empty() {
            bail!("no capture sources given (use - for stdin)");
        }
        Ok(parsed)
    }

    fn apply(&self, config: &mut GlintConfig) {
        if let Some(out) = &self.out {
            config.receiver.output_dir = out.clone();
        }
        if let Some(completion) = self.completion {
            config.receiver.completion = completion;
        }
        if let Some(ratio) = self.ratio {
            config.receiver.tolerant_ratio = ratio;
        }
    }
}

pub async fn run(mut config: GlintConfig, args: RecvArgs) -> Result<()> {
    args.apply(&mut config);
    config.validate().context("invalid receive options")?;

    let receiver = Receiver::from_config(&config.receiver);
    tracing::info!(
        sources = args.inputs.len(),
        policy = ?receiver.policy(),
        "receiver starting"
    );

    let mut streams = Vec::with_capacity(args.inputs.len());
    for (n, input) in args.inputs.iter().enumerate() {
        let id = format!("cam{n}");
        let (events, handle) = spawn_capture(id.clone(), receiver.clone());
        streams.push((id, handle));

        // Readers run on plain threads so a source that never closes (a live
        // stdin pipe) cannot hold the runtime open after completion.
        let input = input.clone();
        std::thread::spawn(move || {
            if input == "-" {
                feed_lines(std::io::stdin().lock(), events);
            } else {
                match std::fs::File::open(&input) {
                    Ok(file) => feed_lines(std::io::BufReader::new(file), events),
                    Err(e) => {
                        let _ = events.blocking_send(ScanEvent::Fault(format!(
                            "cannot open {input}: {e}"
                        )));
                    }
                }
            }
        });
    }

    let all_streams_done = async {
        for (id, handle) in streams {
            match handle.await {
                Ok(Ok(stats)) => tracing::debug!(stream = %id, ?stats, "capture finished"),
                Ok(Err(e)) => tracing::warn!(error = %e, "capture stream failed"),
                Err(e) => tracing::warn!(stream = %id, error = %e, "capture task panicked"),
            }
        }
    };

    let assembled = tokio::select! {
        assembled = receiver.wait_complete() => assembled,
        _ = all_streams_done => receiver.output(),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted");
            receiver.output()
        }
    };

    let Some(assembled) = assembled else {
        let progress = receiver.progress();
        let missing = match ResendRequest::new(receiver.missing()) {
            Ok(request) => request.to_list_string(),
            Err(_) => "all".to_string(),
        };
        bail!(
            "transfer incomplete: {}/{} symbols received (need {}); resend: {}",
            progress.received,
            progress.total,
            progress.required,
            missing
        );
    };

    if !assembled.missing.is_empty() {
        tracing::warn!(
            missing = assembled.missing.len(),
            "output has gaps, content may be incomplete"
        );
    }
    let path = write_artifact(&config.receiver.output_dir, &assembled)?;
    println!("{}", path.display());
    Ok(())
}

/// Forward each line of `source` to a capture stream until EOF. Blocks;
/// call from a dedicated thread.
fn feed_lines<R: BufRead>(source: R, events: mpsc::Sender<ScanEvent>) {
    for line in source.lines() {
        let event = match line {
            Ok(line) => scan_event(&line),
            Err(e) => ScanEvent::Fault(e.to_string()),
        };
        let fault = matches!(event, ScanEvent::Fault(_));
        if events.blocking_send(event).is_err() || fault {
            return;
        }
    }
}

/// Interpret one captured line.
fn scan_event(line: &str) -> ScanEvent {
    let text = match line.split_once('\t') {
        Some((surface, record))
            if !surface.is_empty() && surface.bytes().all(|b| b.is_ascii_digit()) =>
        {
            record
        }
        _ => line,
    };
    let text = text.trim();
    if text.is_empty() {
        ScanEvent::Nothing
    } else {
        ScanEvent::Decoded(text.to_string())
    }
}
