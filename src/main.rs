mod cache;
mod commands;
mod config;
mod daemon;
mod error;
mod jira;
mod logging;
mod output;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::process::ExitCode;

use commands::{EpicArgs, IssueArgs};

#[derive(Parser, Debug)]
#[command(name = "kong")]
#[command(about = "A Jira CLI for low-latency workflows")]
#[command(version)]
struct Cli {
  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
  /// Write the configuration interactively
  Configure,

  /// Keep the local snapshot fresh in the background
  Daemon,

  /// List and create issues
  Issues {
    /// List issues of another project, bypassing the snapshot
    #[arg(short, long)]
    project: Option<String>,

    #[command(subcommand)]
    command: Option<IssuesCommand>,
  },

  /// List and create epics
  Epics {
    #[arg(short, long)]
    project: Option<String>,

    #[command(subcommand)]
    command: Option<EpicsCommand>,
  },

  /// List initiatives
  Initiatives {
    #[arg(short, long)]
    project: Option<String>,
  },

  /// List and create sprints
  Sprints {
    #[arg(short, long)]
    project: Option<String>,

    #[command(subcommand)]
    command: Option<SprintsCommand>,
  },

  /// List and move issues in the current sprint
  Sprint {
    /// Include done issues
    #[arg(short, long)]
    all: bool,

    #[command(subcommand)]
    command: Option<SprintCommand>,
  },

  /// Create a git branch named after the most recently created issue
  Branch,
}

#[derive(Subcommand, Debug)]
enum IssuesCommand {
  /// Create a new issue
  New {
    #[arg(short, long)]
    summary: String,

    #[arg(short, long, default_value = "")]
    description: String,

    /// Epic number, the first column of `kong epics`, 0 for none
    #[arg(short, long)]
    epic: Option<usize>,

    /// Sprint number, the first column of `kong sprints`, 0 for none
    #[arg(long)]
    sprint: Option<usize>,

    /// Story points
    #[arg(long)]
    points: Option<f64>,
  },
}

#[derive(Subcommand, Debug)]
enum EpicsCommand {
  /// Create a new epic
  New {
    #[arg(short, long)]
    summary: String,

    #[arg(short, long, default_value = "")]
    description: String,

    /// Initiative number, the first column of `kong initiatives`, 0 for none
    #[arg(short, long)]
    initiative: Option<usize>,
  },
}

#[derive(Subcommand, Debug)]
enum SprintsCommand {
  /// Create a new sprint
  New {
    name: String,
    /// Start date as MM/DD
    date: String,
  },
}

#[derive(Subcommand, Debug)]
enum SprintCommand {
  /// Apply status changes given as KEY=ACRONYM, `ice` moves to the backlog
  Move {
    #[arg(required = true)]
    moves: Vec<String>,
  },
}

async fn run(command: Commands) -> Result<()> {
  match command {
    Commands::Configure => commands::configure().await,
    Commands::Daemon => commands::daemon().await,
    Commands::Issues { project, command } => match command {
      None => commands::issues(project).await,
      Some(IssuesCommand::New {
        summary,
        description,
        epic,
        sprint,
        points,
      }) => {
        commands::new_issue(IssueArgs {
          summary,
          description,
          epic,
          sprint,
          points,
        })
        .await
      }
    },
    Commands::Epics { project, command } => match command {
      None => commands::epics(project).await,
      Some(EpicsCommand::New {
        summary,
        description,
        initiative,
      }) => {
        commands::new_epic(EpicArgs {
          summary,
          description,
          initiative,
        })
        .await
      }
    },
    Commands::Initiatives { project } => commands::initiatives(project).await,
    Commands::Sprints { project, command } => match command {
      None => commands::sprints(project).await,
      Some(SprintsCommand::New { name, date }) => commands::new_sprint(&name, &date).await,
    },
    Commands::Sprint { all, command } => match command {
      None => commands::sprint(all).await,
      Some(SprintCommand::Move { moves }) => commands::move_sprint_issues(&moves).await,
    },
    Commands::Branch => commands::branch(),
  }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
  color_eyre::install()?;

  let cli = Cli::parse();

  let _guard = match cli.command {
    Commands::Daemon => logging::init_daemon(),
    _ => {
      logging::init_cli();
      None
    }
  };

  let result = tokio::select! {
    result = run(cli.command) => result,
    _ = tokio::signal::ctrl_c() => return Ok(ExitCode::from(130)),
  };

  match result {
    Ok(()) => Ok(ExitCode::SUCCESS),
    Err(report) => {
      let config_missing = report
        .downcast_ref::<error::Error>()
        .is_some_and(error::Error::is_config_missing);
      if config_missing {
        eprintln!("Configuration is missing. Run kong configure");
      } else {
        eprintln!("Error: {}", report);
      }
      Ok(ExitCode::FAILURE)
    }
  }
}
