use clap::{Parser, Subcommand};

const HELP_EPILOG: &str = r#"Server options can also be provided via environment variables:
  CONFIG_PATH (default: ./config.yaml)
  DB_PATH     (default: data/app.db)
  PORT        (default: 5151 or config.listen_port)
"#;

#[derive(Debug, Parser)]
#[command(
    name = "quizguard-server",
    version,
    about = "QuizGuard server",
    long_about = None,
    after_long_help = HELP_EPILOG,
)]
pub struct Cli {
    /// Optional subcommand. Without one, runs the server.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print a bcrypt hash for a password, for use in config.yaml
    HashPassword {
        /// The plaintext password to hash
        password: String,
    },
}
