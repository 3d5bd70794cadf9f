use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use std::path::PathBuf;
use std::str::FromStr;

/// Command line client for an InfoMark course server
///
/// Examples:
///   # Check that the server answers
///   infomark --url https://infomark.example ping
///
///   # Show the account behind INFOMARK_EMAIL / INFOMARK_PASSWORD
///   infomark me
///
///   # Upload a submission on behalf of a student
///   infomark submission upload 1 4 12 solution.zip
///
///   # Send an arbitrary authenticated request
///   infomark raw patch /api/v1/courses/1 name="Graphics I" visible:=true
#[derive(Parser, Debug)]
#[command(name = "infomark", version)]
pub struct Cli {
    /// Server base URL (falls back to INFOMARK_URL, then a prompt)
    #[arg(long, global = true)]
    pub url: Option<String>,

    /// Operator email (falls back to INFOMARK_EMAIL, then a prompt)
    #[arg(long, global = true)]
    pub email: Option<String>,

    /// Verbose mode: print every request and response status
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    /// Log level for diagnostics written to stderr
    #[arg(long = "log-level", value_enum, default_value = "warn", global = true)]
    pub log_level: LogLevel,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Cli {
    /// `--verbose` raises quieter levels to `debug`.
    pub fn effective_log_level(&self) -> LogLevel {
        match self.log_level {
            LogLevel::Error | LogLevel::Warn | LogLevel::Info if self.verbose => LogLevel::Debug,
            level => level,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Tests if the endpoint is available
    Ping,

    /// Show my account information
    Me,

    /// Manage users
    #[command(subcommand)]
    User(UserCommand),

    /// Manage submissions
    #[command(subcommand)]
    Submission(SubmissionCommand),

    /// Send an authenticated request to any endpoint
    #[command(subcommand)]
    Raw(RawCommand),
}

impl Command {
    /// Whether the command needs a bearer token before it runs.
    pub fn requires_credentials(&self) -> bool {
        !matches!(self, Command::Ping)
    }
}

#[derive(Subcommand, Debug)]
pub enum UserCommand {
    /// Find a user
    Find {
        /// Text matched against names and email addresses
        query: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum SubmissionCommand {
    /// Upload a submission on behalf of a student
    Upload(UploadArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct UploadArgs {
    #[arg(value_name = "COURSE_ID")]
    pub course_id: i64,

    #[arg(value_name = "TASK_ID")]
    pub task_id: i64,

    #[arg(value_name = "USER_ID")]
    pub user_id: i64,

    #[arg(value_name = "FILE")]
    pub filename: PathBuf,

    /// MIME type of the file part (guessed from the extension, else application/zip)
    #[arg(long = "content-type")]
    pub content_type: Option<String>,
}

impl UploadArgs {
    pub fn content_type(&self) -> String {
        self.content_type.clone().unwrap_or_else(|| {
            mime_guess::from_path(&self.filename)
                .first()
                .map(|m| m.to_string())
                .unwrap_or_else(|| "application/zip".to_string())
        })
    }
}

#[derive(Subcommand, Debug)]
pub enum RawCommand {
    /// Make a GET request
    Get(PathArgs),

    /// Make a DELETE request
    Delete(PathArgs),

    /// Make a POST request
    Post(BodyArgs),

    /// Make a PUT request
    Put(BodyArgs),

    /// Make a PATCH request
    Patch(BodyArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct PathArgs {
    /// Path below the server URL, e.g. /api/v1/ping
    #[arg(value_name = "PATH", value_parser = parse_path)]
    pub path: String,
}

#[derive(Parser, Debug, Clone)]
pub struct BodyArgs {
    /// Path below the server URL, e.g. /api/v1/courses
    #[arg(value_name = "PATH", value_parser = parse_path)]
    pub path: String,

    /// JSON body fields: key=value (string) or key:=value (raw JSON)
    #[arg(value_name = "FIELD", value_parser = parse_body_item)]
    pub items: Vec<BodyItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BodyItem {
    pub key: String,
    pub value: Value,
}

impl FromStr for BodyItem {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        // key:=json has to be checked before key=string
        if let Some(pos) = s.find(":=") {
            let key = s[..pos].trim().to_string();
            let raw = s[pos + 2..].trim();
            if key.is_empty() {
                return Err(anyhow!("Body key cannot be empty: {}", s));
            }
            let value = serde_json::from_str(raw)
                .map_err(|e| anyhow!("Invalid JSON for '{}': {}", key, e))?;
            return Ok(BodyItem { key, value });
        }

        if let Some(pos) = s.find('=') {
            let key = s[..pos].trim().to_string();
            let value = s[pos + 1..].trim().to_string();
            if key.is_empty() {
                return Err(anyhow!("Body key cannot be empty: {}", s));
            }
            return Ok(BodyItem {
                key,
                value: Value::String(value),
            });
        }

        Err(anyhow!(
            "Invalid format: '{}'. Expected 'key=value' or 'key:=json'",
            s
        ))
    }
}

// ============================================================================
// Parse Function
// ============================================================================

fn parse_path(s: &str) -> Result<String> {
    if !s.starts_with('/') {
        return Err(anyhow!("Path must start with '/': {}", s));
    }
    Ok(s.into())
}

fn parse_body_item(s: &str) -> Result<BodyItem> {
    s.parse()
}

// ============================================================================
// Tests
// ============================================================================
