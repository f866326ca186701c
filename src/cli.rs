use crate::config;
use crate::domains::copier::CancelFlag;
use crate::manager::{
    AgentOptions, GoOptions, LaunchOptions, Manager, NewOptions, RemoveOptions,
};
use crate::shellhook;
use crate::ui;
use clap::error::ErrorKind;
use clap::{Args, Parser, Subcommand};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Parser)]
#[command(
    name = "sprout",
    about = "Git worktree fleets with tmux sessions and coding agents",
    disable_version_flag = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the interactive dashboard
    Ui,
    /// Create a worktree on a new or existing branch
    New(NewArgs),
    /// List all worktrees
    List {
        /// Emit a JSON array instead of the table
        #[arg(long)]
        json: bool,
    },
    /// Switch to a worktree, ensuring its session is live
    Go {
        /// Branch name or worktree path
        target: String,
        /// Attach the terminal to the session when outside tmux
        #[arg(long)]
        attach: bool,
        /// Only resolve the path; do not touch tmux
        #[arg(long = "no-launch")]
        no_launch: bool,
    },
    /// Print the absolute path of a worktree
    Path {
        /// Branch name or worktree path
        target: String,
    },
    /// Ensure a worktree's tmux session exists
    Launch {
        /// Branch name or worktree path
        target: String,
        /// Build the session without attaching to it
        #[arg(long = "no-attach")]
        no_attach: bool,
    },
    /// Kill a worktree's tmux session
    Detach {
        /// Branch name or worktree path
        target: String,
    },
    /// Manage the agent window of a worktree
    Agent {
        #[command(subcommand)]
        action: AgentAction,
    },
    /// Remove a worktree
    #[command(name = "rm", alias = "remove")]
    Rm {
        /// Branch name or worktree path
        target: String,
        /// Remove even when the tree is dirty
        #[arg(long)]
        force: bool,
        /// Also delete the branch when nothing else has it checked out
        #[arg(long = "delete-branch")]
        delete_branch: bool,
    },
    /// Check required and optional tooling
    Doctor,
    /// Print shell integration for zsh, bash, or fish
    #[command(name = "shell-hook")]
    ShellHook {
        /// Shell flavor: zsh, bash, or fish
        shell: String,
    },
    /// Print the version
    Version,
}

#[derive(Debug, Args)]
struct NewArgs {
    /// Branch type: feat, fix, chore, docs, refactor, or test
    branch_type: Option<String>,
    /// Human title; slugified into the branch name
    name: Vec<String>,
    /// Base branch to fork from
    #[arg(long = "from")]
    from: Option<String>,
    /// Check out an existing local or remote branch instead
    #[arg(long = "from-branch")]
    from_branch: Option<String>,
    /// Skip launching the tmux session
    #[arg(long = "no-launch")]
    no_launch: bool,
}

#[derive(Debug, Subcommand)]
enum AgentAction {
    /// Start the agent window without attaching
    Start {
        /// Branch name or worktree path
        target: String,
    },
    /// Kill only the agent window
    Stop {
        /// Branch name or worktree path
        target: String,
    },
    /// Start the agent window and attach to it
    Attach {
        /// Branch name or worktree path
        target: String,
    },
}

pub fn run(args: Vec<String>) -> i32 {
    // The version aliases predate the clap surface; keep all three.
    if matches!(
        args.first().map(String::as_str),
        Some("version") | Some("-v") | Some("--version")
    ) {
        println!("{VERSION}");
        return 0;
    }

    let cli = match Cli::try_parse_from(std::iter::once("sprout".to_string()).chain(args)) {
        Ok(cli) => cli,
        Err(err) => {
            return match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                    let _ = err.print();
                    0
                }
                _ => {
                    let _ = err.print();
                    1
                }
            };
        }
    };

    let cfg = match config::load() {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("error: {err}");
            return 1;
        }
    };
    let mgr = Manager::new(cfg);

    match cli.command {
        None | Some(Command::Ui) => ui::run(mgr),
        Some(Command::New(args)) => run_new(&mgr, args),
        Some(Command::List { json }) => run_list(&mgr, json),
        Some(Command::Go {
            target,
            attach,
            no_launch,
        }) => run_go(&mgr, target, attach, no_launch),
        Some(Command::Path { target }) => run_path(&mgr, target),
        Some(Command::Launch { target, no_attach }) => run_launch(&mgr, target, no_attach),
        Some(Command::Detach { target }) => run_detach(&mgr, target),
        Some(Command::Agent { action }) => run_agent(&mgr, action),
        Some(Command::Rm {
            target,
            force,
            delete_branch,
        }) => run_remove(&mgr, target, force, delete_branch),
        Some(Command::Doctor) => run_doctor(&mgr),
        Some(Command::ShellHook { shell }) => run_shell_hook(&shell),
        Some(Command::Version) => {
            println!("{VERSION}");
            0
        }
    }
}

fn emit_cd_marker_if_enabled(mgr: &Manager, path: &std::path::Path) {
    if mgr.cfg.emit_cd_marker {
        println!("__SPROUT_CD__={}", path.display());
    }
}

fn run_new(mgr: &Manager, args: NewArgs) -> i32 {
    let mut opts = NewOptions {
        base_branch: args.from.unwrap_or_default(),
        launch: mgr.cfg.auto_launch && !args.no_launch,
        ..NewOptions::default()
    };

    if let Some(from_branch) = args.from_branch {
        opts.from_branch = from_branch;
    } else {
        let branch_type = match args.branch_type {
            Some(branch_type) if !args.name.is_empty() => branch_type,
            _ => {
                eprintln!(
                    "error: usage: sprout new <type> <name> [--from <base>] [--no-launch]"
                );
                return 1;
            }
        };
        opts.branch_type = branch_type;
        opts.name = args.name.join(" ");
    }

    let (_, path) = match mgr.new_worktree(&opts, None, &CancelFlag::new()) {
        Ok(result) => result,
        Err(err) => {
            eprintln!("error: {err}");
            return 1;
        }
    };

    if mgr.cfg.auto_start_agent {
        let agent_opts = AgentOptions {
            target: path.display().to_string(),
            attach: false,
        };
        if let Err(err) = mgr.start_agent(&agent_opts) {
            eprintln!("warn: created worktree but could not auto-start agent: {err}");
        }
    }

    println!("{}", path.display());
    emit_cd_marker_if_enabled(mgr, &path);
    0
}

fn run_list(mgr: &Manager, json: bool) -> i32 {
    let items = match mgr.list_worktrees() {
        Ok(items) => items,
        Err(err) => {
            eprintln!("error: {err}");
            return 1;
        }
    };

    if json {
        match serde_json::to_string_pretty(&items) {
            Ok(out) => println!("{out}"),
            Err(err) => {
                eprintln!("error: {err}");
                return 1;
            }
        }
        return 0;
    }

    println!(
        "{:<3} {:<35} {:<7} {:<6} {:<6} {}",
        "CUR", "BRANCH", "STATUS", "TMUX", "AGENT", "PATH"
    );
    for item in items {
        let cur = if item.current { "*" } else { "" };
        let branch = if item.branch.is_empty() {
            "detached"
        } else {
            &item.branch
        };
        let status = if item.dirty { "dirty" } else { "clean" };
        println!(
            "{:<3} {:<35} {:<7} {:<6} {:<6} {}",
            cur,
            branch,
            status,
            item.tmux_state,
            item.agent_state,
            item.path.display()
        );
    }
    0
}

fn run_go(mgr: &Manager, target: String, attach: bool, no_launch: bool) -> i32 {
    let opts = GoOptions {
        target,
        launch: !no_launch,
        attach,
    };
    match mgr.go(&opts) {
        Ok(path) => {
            println!("{}", path.display());
            emit_cd_marker_if_enabled(mgr, &path);
            0
        }
        Err(err) => {
            eprintln!("error: {err}");
            1
        }
    }
}

fn run_path(mgr: &Manager, target: String) -> i32 {
    match mgr.path(&target) {
        Ok(path) => {
            println!("{}", path.display());
            0
        }
        Err(err) => {
            eprintln!("error: {err}");
            1
        }
    }
}

fn run_launch(mgr: &Manager, target: String, no_attach: bool) -> i32 {
    let opts = LaunchOptions { target, no_attach };
    match mgr.launch(&opts) {
        Ok(path) => {
            println!("{}", path.display());
            0
        }
        Err(err) => {
            eprintln!("error: {err}");
            1
        }
    }
}

fn run_detach(mgr: &Manager, target: String) -> i32 {
    match mgr.detach(&target) {
        Ok((path, true)) => {
            println!("detached {}", path.display());
            0
        }
        Ok((path, false)) => {
            println!("session not running: {}", path.display());
            0
        }
        Err(err) => {
            eprintln!("error: {err}");
            1
        }
    }
}

fn run_agent(mgr: &Manager, action: AgentAction) -> i32 {
    match action {
        AgentAction::Start { target } => {
            let opts = AgentOptions {
                target,
                attach: false,
            };
            match mgr.start_agent(&opts) {
                Ok((path, true)) => {
                    println!("agent already running: {}", path.display());
                    0
                }
                Ok((path, false)) => {
                    println!("agent started: {}", path.display());
                    0
                }
                Err(err) => {
                    eprintln!("error: {err}");
                    1
                }
            }
        }
        AgentAction::Attach { target } => match mgr.attach_agent(&target) {
            Ok(path) => {
                println!("agent attached: {}", path.display());
                0
            }
            Err(err) => {
                eprintln!("error: {err}");
                1
            }
        },
        AgentAction::Stop { target } => match mgr.stop_agent(&target) {
            Ok((path, true)) => {
                println!("agent stopped: {}", path.display());
                0
            }
            Ok((path, false)) => {
                println!("agent not running: {}", path.display());
                0
            }
            Err(err) => {
                eprintln!("error: {err}");
                1
            }
        },
    }
}

fn run_remove(mgr: &Manager, target: String, force: bool, delete_branch: bool) -> i32 {
    let opts = RemoveOptions {
        target,
        force,
        delete_branch,
    };
    match mgr.remove(&opts, None, &CancelFlag::new()) {
        Ok((path, warnings)) => {
            for warning in warnings {
                eprintln!("warn: {warning}");
            }
            println!("removed {}", path.display());
            0
        }
        Err(err) => {
            eprintln!("error: {err}");
            1
        }
    }
}

fn run_doctor(mgr: &Manager) -> i32 {
    let report = mgr.doctor();
    for line in report.lines {
        println!("{line}");
    }
    report.exit_code
}

fn run_shell_hook(shell: &str) -> i32 {
    match shellhook::shell_hook(shell) {
        Ok(hook) => {
            print!("{hook}");
            0
        }
        Err(err) => {
            eprintln!("error: {err}");
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_aliases_short_circuit() {
        assert_eq!(run(vec!["version".to_string()]), 0);
        assert_eq!(run(vec!["--version".to_string()]), 0);
        assert_eq!(run(vec!["-v".to_string()]), 0);
    }

    #[test]
    fn cli_parses_every_documented_command() {
        let cases: &[&[&str]] = &[
            &["sprout", "ui"],
            &["sprout", "new", "feat", "my", "feature"],
            &["sprout", "new", "--from-branch", "shared"],
            &["sprout", "new", "feat", "x", "--from", "develop", "--no-launch"],
            &["sprout", "list", "--json"],
            &["sprout", "go", "feat/x", "--attach", "--no-launch"],
            &["sprout", "path", "feat/x"],
            &["sprout", "launch", "feat/x", "--no-attach"],
            &["sprout", "detach", "feat/x"],
            &["sprout", "agent", "start", "feat/x"],
            &["sprout", "agent", "stop", "feat/x"],
            &["sprout", "agent", "attach", "feat/x"],
            &["sprout", "rm", "feat/x", "--force", "--delete-branch"],
            &["sprout", "remove", "feat/x"],
            &["sprout", "doctor"],
            &["sprout", "shell-hook", "zsh"],
        ];
        for case in cases {
            assert!(
                Cli::try_parse_from(case.iter().copied()).is_ok(),
                "failed to parse: {case:?}"
            );
        }
    }

    #[test]
    fn unknown_flags_are_rejected() {
        assert!(Cli::try_parse_from(["sprout", "list", "--bogus"]).is_err());
        assert!(Cli::try_parse_from(["sprout", "agent", "restart", "x"]).is_err());
    }
}
