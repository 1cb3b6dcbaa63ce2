//! glint — send and receive files over a stream of optical symbols.
//!
//! `glint send` prints one `surface<TAB>record` line per emission on stdout,
//! for a renderer to draw. `glint recv` reads decoded record lines from one
//! or more capture sources and writes the reassembled file.

use anyhow::Result;

use glint_core::config::GlintConfig;

mod cmd;

fn print_usage() {
    println!("glint — optical file transfer");
    println!();
    println!("Usage:");
    println!("  glint send <file> [options]");
    println!("      --fps N            symbols per second");
    println!("      --policy P         direct | redundant");
    println!("      --format F         compact | legacy");
    println!("      --surfaces N       render surfaces (symbol i goes to i % N)");
    println!("      --loop             cycle until interrupted");
    println!("      --resend LIST      send only these indices, e.g. \"1, 3, 5\"");
    println!("      --hold             keep running for operator commands when done");
    println!();
    println!("  glint recv <capture>... [options]");
    println!("      <capture>          file of decoded records, one per line, or - for stdin");
    println!("      --out DIR          output directory");
    println!("      --completion M     strict | tolerant");
    println!("      --ratio R          tolerant completion ratio");
    println!();
    println!("Operator commands (stdin, while sending):");
    println!("  pause | resume | start | reset | fps N | resend LIST | status");
    println!();
    println!("Logging goes to stderr; set RUST_LOG=glint=debug for detail.");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = GlintConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = GlintConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        GlintConfig::default()
    });

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.split_first() {
        Some((cmd, rest)) if cmd == "send" => {
            let send_args = cmd::send::SendArgs::parse(rest)?;
            cmd::send::run(config, send_args).await
        }
        Some((cmd, rest)) if cmd == "recv" => {
            let recv_args = cmd::recv::RecvArgs::parse(rest)?;
            cmd::recv::run(config, recv_args).await
        }
        None => {
            print_usage();
            Ok(())
        }
        Some((cmd, _)) if matches!(cmd.as_str(), "help" | "--help" | "-h") => {
            print_usage();
            Ok(())
        }
        Some((other, _)) => {
            eprintln!("Unknown command: {}", other);
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
