mod amend;
mod backend;
mod blame;
mod commit_graph;
mod config;
mod diff_parser;
mod errors;
mod indexed_range;
mod msg;
mod oid;
mod rebuild;
mod tree_diff;
mod vcs;

#[cfg(test)]
mod test_helpers;

use std::io::{IsTerminal, Write};
use std::path::PathBuf;

use clap::Parser;
use colored::control;

use amend::{add_hunk_to_plan, AmendmentPlan};
use backend::Backend;
use diff_parser::parse_diff_hunks;
use oid::Oid;
use rebuild::AmendedBranchBuilder;
use vcs::Repo;

/// Absorb staged changes back into the historical commits that own the
/// edited lines, rewriting that commit and every descendant up to head.
#[derive(Parser)]
#[command(name = "git-entropy", about = "Absorb staged changes into the commits that own their lines")]
struct Cli {
    /// Commit beyond which history is not considered (exclusive), given
    /// positionally. Mutually exclusive with `--root`; when neither is
    /// given, the whole reachable history of HEAD is eligible.
    #[arg(conflicts_with = "root")]
    upstream: Option<String>,

    /// Same bound as the positional `upstream`, given as a flag.
    #[arg(long = "root")]
    root: Option<String>,

    /// Restrict the operation to these paths (matches the staged diff's
    /// own pathspec semantics).
    paths: Vec<String>,

    /// Compute and report the rewrite, but never move the branch ref.
    #[arg(long)]
    no_update: bool,

    /// Print progress for each commit the backend rewrites.
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Disable colored output.
    #[arg(long)]
    no_color: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let use_color = !cli.no_color && std::io::stdout().is_terminal();
    control::set_override(use_color);
    msg::set_verbose(cli.verbose);

    tokio::select! {
        result = run(cli) => {
            if let Err(err) = result {
                if !err.is_suppressed_interrupt() {
                    let mut text = err.to_string();
                    if let Some(extended) = err.extended() {
                        text.push('\n');
                        text.push_str(extended);
                    }
                    msg::error(&text);
                }
                std::process::exit(err.exit_code());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            // 128 + SIGINT, matching the shell convention the original
            // implementation's bare `except KeyboardInterrupt` emulates.
            std::process::exit(130);
        }
    }
}

async fn run(cli: Cli) -> errors::Result<()> {
    let repo = Repo::discover(&PathBuf::from("."))?;
    let config = config::Config::load(&repo);

    let head = repo.resolve_revision("HEAD")?;
    let root_spec = cli.upstream.as_deref().or(cli.root.as_deref());
    let root = root_spec.map(|r| repo.resolve_revision(r)).transpose()?;

    let plan = build_plan(&repo, head, root, &cli.paths)?;

    if !plan.has_amendments() {
        msg::success("nothing to absorb");
        return Ok(());
    }

    let backend = Backend::launch(repo.workdir.clone(), config.queue_capacity);
    let new_head = match AmendedBranchBuilder::write(&repo, &backend, &plan).await {
        Ok(oid) => oid,
        Err(err) => {
            backend.cancel(err.clone()).await;
            backend.join().await.ok();
            return Err(err);
        }
    };
    backend.join().await?;

    if new_head == head {
        msg::success("nothing to absorb");
        return Ok(());
    }

    let head_hex = head.to_hex();
    let new_head_hex = new_head.to_hex();
    repo.run_passthrough(&["range-diff", &format!("{head_hex}...{new_head_hex}")])?;
    repo.run_passthrough(&["diff", "--staged", &new_head_hex])?;

    if cli.no_update || !config.update_refs {
        return Ok(());
    }

    if !confirm("proceed? [y/N] ")? {
        return Ok(());
    }

    repo.run(&[
        "update-ref",
        "-m",
        "entropy: absorb staged changes",
        "HEAD",
        &new_head_hex,
        &head_hex,
    ])?;
    msg::success(&format!("absorbed into {}", new_head_hex));
    Ok(())
}

fn confirm(prompt: &str) -> errors::Result<bool> {
    print!("{prompt}");
    std::io::stdout().flush().ok();
    let mut line = String::new();
    std::io::stdin().read_line(&mut line).ok();
    Ok(matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

/// Build an `AmendmentPlan` by diffing the index against `head` and
/// routing each hunk through blame-based attribution.
fn build_plan(repo: &Repo, head: Oid, root: Option<Oid>, paths: &[String]) -> errors::Result<AmendmentPlan> {
    let mut args = vec![
        "diff-index".to_string(),
        "--cached".to_string(),
        "--find-renames".to_string(),
        "--patch".to_string(),
        "--no-indent-heuristic".to_string(),
        head.to_hex(),
    ];
    if !paths.is_empty() {
        args.push("--".to_string());
        args.extend(paths.iter().cloned());
    }
    let arg_refs: Vec<&str> = args.iter().map(|s| s.as_str()).collect();
    let diff = repo.run(&arg_refs)?;
    let hunks = parse_diff_hunks(&diff)?;

    let mut plan = AmendmentPlan::new(head, root);
    for hunk in &hunks {
        let Some(old_file) = hunk.old_file.as_deref() else {
            continue;
        };
        msg::progress(&format!(
            "attributing {} @@ -{},{}",
            String::from_utf8_lossy(old_file),
            hunk.old_start,
            hunk.old_extent(),
        ));
        add_hunk_to_plan(&mut plan, repo, head, root, old_file, hunk)?;
    }

    Ok(plan)
}
