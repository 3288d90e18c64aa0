//! Error handling and display for the CLI.

use colored::Colorize;
use thiserror::Error;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("API error: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
        request_id: Option<String>,
        retryable: bool,
    },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl CliError {
    /// Create an API error from response details.
    pub fn api(
        status: u16,
        code: impl Into<String>,
        message: impl Into<String>,
        request_id: Option<String>,
        retryable: bool,
    ) -> Self {
        Self::Api {
            status,
            code: code.into(),
            message: message.into(),
            request_id,
            retryable,
        }
    }
}

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {}", "Error:".red().bold(), err);

    let Some(cli_err) = err.downcast_ref::<CliError>() else {
        return;
    };

    match cli_err {
        CliError::Api { code, .. } if code == "capacity_exhausted" => {
            eprintln!(
                "\n{}",
                "Hint: The pool is at its bus ceiling. Run `rp sweep` or raise RULEPOOL_MAX_BUSES."
                    .yellow()
            );
        }
        CliError::Api {
            retryable: true, ..
        } => {
            eprintln!("\n{}", "Hint: This request can be retried.".yellow());
        }
        CliError::Network(_) => {
            eprintln!(
                "\n{}",
                "Hint: Check that the scheduler is running and --api-url is correct.".yellow()
            );
        }
        _ => {}
    }

    if let CliError::Api {
        request_id: Some(request_id),
        ..
    } = cli_err
    {
        eprintln!("\nRequest ID: {}", request_id);
    }
}
