//! Command-line interface definitions.
//!
//! All options can be given as flags or environment variables; the secrets
//! normally arrive through a `.env` file loaded at startup.

use clap::Parser;

/// Command-line arguments for the outage aggregation service.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// PostgreSQL connection URL for the outage store
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// API key for the extraction model
    #[arg(long, env = "GEMINI_API_KEY")]
    pub gemini_api_key: String,

    /// Which Gemini model reads the schedule documents
    #[arg(long, env = "GEMINI_MODEL", default_value = "gemini-2.5-pro")]
    pub gemini_model: String,

    /// Address the query API listens on
    #[arg(short, long, default_value = "0.0.0.0:8000")]
    pub listen: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from(&[
            "apagones",
            "--database-url",
            "postgres://localhost/outages",
            "--gemini-api-key",
            "k",
        ]);

        assert_eq!(cli.database_url, "postgres://localhost/outages");
        assert_eq!(cli.gemini_model, "gemini-2.5-pro");
        assert_eq!(cli.listen, "0.0.0.0:8000");
    }

    #[test]
    fn test_listen_short_flag() {
        let cli = Cli::parse_from(&[
            "apagones",
            "--database-url",
            "postgres://localhost/outages",
            "--gemini-api-key",
            "k",
            "-l",
            "127.0.0.1:9000",
        ]);

        assert_eq!(cli.listen, "127.0.0.1:9000");
    }
}
