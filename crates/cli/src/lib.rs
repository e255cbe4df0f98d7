pub mod bootstrap;
pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

use commands::CustomerArgs;

#[derive(Debug, Parser)]
#[command(
    name = "supportdesk",
    about = "Supportdesk customer support CLI",
    long_about = "Chat with the support desk, inspect or reset stored sessions, apply migrations, and inspect configuration and agent prompts.",
    after_help = "Examples:\n  supportdesk chat --session demo --tier premium\n  supportdesk history --session demo\n  supportdesk prompt billing --tier premium\n  supportdesk config"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Start an interactive support conversation")]
    Chat {
        #[arg(long, default_value = "default", help = "Session to continue or create")]
        session: String,
        #[command(flatten)]
        customer: CustomerArgs,
    },
    #[command(about = "Print a session's stored turns and active agent as JSON")]
    History {
        #[arg(long, default_value = "default")]
        session: String,
    },
    #[command(about = "Clear a session and return it to triage")]
    Reset {
        #[arg(long, default_value = "default")]
        session: String,
    },
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Render the instructions an agent receives for a customer")]
    Prompt {
        #[arg(help = "triage, account, billing, order or technical")]
        agent: String,
        #[command(flatten)]
        customer: CustomerArgs,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Chat { session, customer } => commands::chat::run(&session, &customer),
        Command::History { session } => commands::history::run(&session),
        Command::Reset { session } => commands::reset::run(&session),
        Command::Migrate => commands::migrate::run(),
        Command::Config => commands::config::run(),
        Command::Prompt { agent, customer } => commands::prompt::run(&agent, &customer),
    };

    if !result.output.is_empty() {
        println!("{}", result.output);
    }
    ExitCode::from(result.exit_code)
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Command};

    #[test]
    fn chat_defaults_to_the_basic_demo_customer() {
        let cli = Cli::parse_from(["supportdesk", "chat"]);
        match cli.command {
            Command::Chat { session, customer } => {
                assert_eq!(session, "default");
                assert_eq!(customer.name, "nana");
                assert_eq!(customer.tier, "basic");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn prompt_takes_agent_and_customer_flags() {
        let cli = Cli::parse_from(["supportdesk", "prompt", "billing", "--tier", "premium"]);
        match cli.command {
            Command::Prompt { agent, customer } => {
                assert_eq!(agent, "billing");
                assert_eq!(customer.tier, "premium");
                assert_eq!(customer.email, "ktra@example.com");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
