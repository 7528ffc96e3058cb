use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use jhelp::{GlossaryClient, JHelpError, Request, config::ClientConfig};

#[derive(Parser, Debug)]
#[command(author, version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Parser, Debug)]
struct CommandOpts {
    /// JSON config file with host and port.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Relay server address, overrides the config file.
    #[arg(short, long)]
    addr: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show a term and its definitions.
    Find {
        term: String,
        #[command(flatten)]
        opts: CommandOpts,
    },
    /// Add a definition, creating the term if needed.
    Add {
        term: String,
        definition: String,
        #[command(flatten)]
        opts: CommandOpts,
    },
    /// Rewrite a term and/or one of its definitions.
    Edit {
        term: String,
        /// Definition number, as printed by `find`.
        index: usize,
        /// New text of the term.
        #[arg(long)]
        new_term: Option<String>,
        /// New text of the definition.
        #[arg(long)]
        definition: Option<String>,
        #[command(flatten)]
        opts: CommandOpts,
    },
    /// Delete one definition; the term goes with its last definition.
    #[command(alias = "rm")]
    Delete {
        term: String,
        /// Definition number, as printed by `find`.
        index: usize,
        #[command(flatten)]
        opts: CommandOpts,
    },
}

impl Commands {
    fn opts(&self) -> &CommandOpts {
        match self {
            Commands::Find { opts, .. }
            | Commands::Add { opts, .. }
            | Commands::Edit { opts, .. }
            | Commands::Delete { opts, .. } => opts,
        }
    }
}

fn print_response(response: &Request) {
    match response.term() {
        Some(term) => println!("{} [{}]", term.text, term.id.unwrap_or_default()),
        None => println!("{}", response.key.text),
    }
    for (index, value) in response.values.iter().enumerate() {
        match value.id {
            Some(_) => println!("  {}. {}", index + 1, value.text),
            None => println!("  {}", value.text),
        }
    }
}

/// Definition numbers are printed starting at 1.
fn position(index: usize) -> jhelp::Result<usize> {
    index
        .checked_sub(1)
        .ok_or_else(|| JHelpError::ProtocolViolation("definitions are numbered from 1".into()))
}

fn run(command: Commands) -> jhelp::Result<()> {
    let opts = command.opts();
    let addr = match &opts.addr {
        Some(addr) => addr.clone(),
        None => jhelp::config::load::<ClientConfig>(opts.config.as_deref())?.addr(),
    };
    let mut client = GlossaryClient::connect(&addr)?;

    let response = match command {
        Commands::Find { term, .. } => client.find(&term)?,
        Commands::Add {
            term, definition, ..
        } => client.add(&term, &definition)?,
        Commands::Edit {
            term,
            index,
            new_term,
            definition,
            ..
        } => {
            let index = position(index)?;
            let current = client.find(&term)?;
            let old_definition = current
                .values
                .get(index)
                .map(|v| v.text.clone())
                .unwrap_or_default();
            client.edit(
                index,
                new_term.as_deref().unwrap_or(&term),
                definition.as_deref().unwrap_or(&old_definition),
            )?
        }
        Commands::Delete { term, index, .. } => {
            let index = position(index)?;
            client.find(&term)?;
            client.delete(index)?
        }
    };
    print_response(&response);
    client.disconnect()
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {e}", e.kind());
            ExitCode::FAILURE
        }
    }
}
