use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::cli::{BodyArgs, Cli, Command, RawCommand, SubmissionCommand, UploadArgs, UserCommand};
use crate::client::Transport;
use crate::connection::{Connection, CredentialSource};
use crate::request::{Bridge, JsonMap};
use crate::response::{print_body, ParsedResponse};

pub const PING_PATH: &str = "/api/v1/ping";
pub const ACCOUNT_PATH: &str = "/api/v1/account";
pub const USER_FIND_PATH: &str = "/api/v1/users/find";

/// Account record as returned by the account and user search endpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserResponse {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub avatar_url: Option<String>,
    pub email: String,
    pub student_number: String,
    pub semester: i32,
    pub subject: String,
    pub language: String,
    pub root: bool,
}

pub fn submission_path(course_id: i64, task_id: i64) -> String {
    format!("/api/v1/courses/{}/tasks/{}/submission", course_id, task_id)
}

/// Appends `key=value` pairs to `path`, percent-encoding them.
pub fn path_with_query(path: &str, pairs: &[(&str, &str)]) -> Result<String> {
    let mut url = Url::parse("http://localhost")?.join(path)?;
    if !pairs.is_empty() {
        url.query_pairs_mut().extend_pairs(pairs);
    }
    Ok(match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    })
}

/// Local checks that must pass before any prompt or network call.
pub fn preflight(command: &Command) -> Result<()> {
    if let Command::Submission(SubmissionCommand::Upload(args)) = command {
        if !args.filename.is_file() {
            bail!("File {} does not exist", args.filename.display());
        }
    }
    Ok(())
}

/// Resolves the connection the command needs, then runs it.
pub async fn execute<T: Transport>(
    cli: &Cli,
    transport: T,
    source: &mut impl CredentialSource,
) -> Result<()> {
    preflight(&cli.command)?;

    let mut conn = Connection::new(cli.url.clone(), cli.email.clone());
    conn.require_url(source)?;
    if cli.command.requires_credentials() {
        conn.require_credentials(&transport, source)
            .await
            .context("Login failed")?;
    }

    let bridge = Bridge::new(&transport, &conn).verbose(cli.verbose);
    run(&cli.command, &bridge).await
}

pub async fn run<T: Transport>(command: &Command, bridge: &Bridge<'_, T>) -> Result<()> {
    match command {
        Command::Ping => ping(bridge).await,
        Command::Me => me(bridge).await,
        Command::User(UserCommand::Find { query }) => find_user(bridge, query).await,
        Command::Submission(SubmissionCommand::Upload(args)) => upload(bridge, args).await,
        Command::Raw(raw) => raw_request(bridge, raw).await,
    }
}

pub async fn ping<T: Transport>(bridge: &Bridge<'_, T>) -> Result<()> {
    let w = bridge.get(PING_PATH, &[]).await?;
    println!("{}", w.plain().await?);
    Ok(())
}

pub async fn me<T: Transport>(bridge: &Bridge<'_, T>) -> Result<()> {
    let conn = bridge.connection();
    let w = bridge.get(ACCOUNT_PATH, &[conn]).await?;
    let data: UserResponse = decode_or_report(w).await?;

    println!("ID             {}", data.id);
    println!("FirstName      {}", data.first_name);
    println!("LastName       {}", data.last_name);
    println!("AvatarURL      {}", data.avatar_url.unwrap_or_default());
    println!("Email          {}", data.email);
    println!("StudentNumber  {}", data.student_number);
    println!("Semester       {}", data.semester);
    println!("Subject        {}", data.subject);
    println!("Language       {}", data.language);
    println!("Root           {}", data.root);
    Ok(())
}

pub async fn find_user<T: Transport>(bridge: &Bridge<'_, T>, query: &str) -> Result<()> {
    let conn = bridge.connection();
    let path = path_with_query(USER_FIND_PATH, &[("query", query)])?;
    let w = bridge.get(&path, &[conn]).await?;
    let users: Vec<UserResponse> = decode_or_report(w).await?;

    for line in user_listing(&users, query) {
        println!("{}", line);
    }
    Ok(())
}

/// Table of search hits framed by a summary line on both ends, with a blank
/// separator after every tenth row.
pub fn user_listing(users: &[UserResponse], query: &str) -> Vec<String> {
    let summary = format!("found {} users matching {}", users.len(), query);
    let mut lines = vec![summary.clone()];
    for (k, user) in users.iter().enumerate() {
        lines.push(format!(
            "{:4} {:>20} {:>20} {:>50}",
            user.id, user.first_name, user.last_name, user.email
        ));
        if k % 10 == 0 && k != 0 {
            lines.push(String::new());
        }
    }
    lines.push(summary);
    lines
}

pub async fn upload<T: Transport>(bridge: &Bridge<'_, T>, args: &UploadArgs) -> Result<()> {
    let conn = bridge.connection();
    let path = submission_path(args.course_id, args.task_id);
    let mut params = BTreeMap::new();
    params.insert("user_id".to_string(), args.user_id.to_string());

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner} {msg}")?);
    spinner.set_message(format!("Uploading {}", args.filename.display()));
    spinner.enable_steady_tick(Duration::from_millis(100));

    let result = bridge
        .upload_with_parameters(&path, &args.filename, &args.content_type(), &params, &[conn])
        .await;
    spinner.finish_and_clear();

    let w = result.with_context(|| format!("Cannot upload {}", args.filename.display()))?;
    print_status_once(bridge, &w);
    Ok(())
}

pub async fn raw_request<T: Transport>(bridge: &Bridge<'_, T>, raw: &RawCommand) -> Result<()> {
    let conn = bridge.connection();
    let w = match raw {
        RawCommand::Get(args) => bridge.get(&args.path, &[conn]).await?,
        RawCommand::Delete(args) => bridge.delete(&args.path, &[conn]).await?,
        RawCommand::Post(args) => bridge.post(&args.path, body_of(args).as_ref(), &[conn]).await?,
        RawCommand::Put(args) => bridge.put(&args.path, body_of(args).as_ref(), &[conn]).await?,
        RawCommand::Patch(args) => {
            bridge.patch(&args.path, body_of(args).as_ref(), &[conn]).await?
        }
    };

    print_status_once(bridge, &w);
    let mime = w.content_type();
    let body = w.plain().await?;
    if !body.is_empty() {
        print_body(mime, &body);
    }
    Ok(())
}

// A verbose bridge has already echoed the status while playing the request.
fn print_status_once<T: Transport>(bridge: &Bridge<'_, T>, w: &ParsedResponse) {
    if !bridge.is_verbose() {
        w.print_status();
    }
}

fn body_of(args: &BodyArgs) -> Option<JsonMap> {
    if args.items.is_empty() {
        return None;
    }
    Some(
        args.items
            .iter()
            .map(|item| (item.key.clone(), item.value.clone()))
            .collect(),
    )
}

/// Decodes a successful response; a failed one becomes an error carrying the status.
async fn decode_or_report<D: serde::de::DeserializeOwned>(w: ParsedResponse) -> Result<D> {
    if !w.ok() {
        let status = w.status();
        let body = w.plain().await.unwrap_or_default();
        bail!("Server answered {}: {}", status, body.trim());
    }
    Ok(w.decode_json().await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::fake::FakeTransport;
    use crate::connection::PASSWORD_ENV;
    use clap::Parser;
    use reqwest::header::AUTHORIZATION;
    use reqwest::Method;

    struct EnvOnly(Vec<(&'static str, &'static str)>);

    impl CredentialSource for EnvOnly {
        fn var(&self, key: &str) -> Option<String> {
            self.0
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }

        fn read_line(&mut self, prompt: &str) -> Result<String, crate::BridgeError> {
            panic!("unexpected prompt: {prompt}")
        }

        fn read_password(&mut self, prompt: &str) -> Result<String, crate::BridgeError> {
            panic!("unexpected prompt: {prompt}")
        }

        fn notice(&mut self, _message: &str) {}
    }

    fn source() -> EnvOnly {
        EnvOnly(vec![(PASSWORD_ENV, "secret")])
    }

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["infomark", "--url", "http://svc", "--email", "a@b.com"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn query_is_percent_encoded() {
        assert_eq!(
            path_with_query(USER_FIND_PATH, &[("query", "ann & bob")]).unwrap(),
            "/api/v1/users/find?query=ann+%26+bob"
        );
        assert_eq!(path_with_query("/api/v1/ping", &[]).unwrap(), "/api/v1/ping");
    }

    #[test]
    fn submission_path_works() {
        assert_eq!(submission_path(3, 7), "/api/v1/courses/3/tasks/7/submission");
    }

    #[test]
    fn user_listing_is_framed_by_summary() {
        let users: Vec<UserResponse> = (0..12)
            .map(|id| UserResponse {
                id,
                first_name: "Ada".into(),
                last_name: "Lovelace".into(),
                email: format!("ada{id}@b.com"),
                ..UserResponse::default()
            })
            .collect();

        let lines = user_listing(&users, "ada");
        assert_eq!(lines.first().unwrap(), "found 12 users matching ada");
        assert_eq!(lines.last().unwrap(), "found 12 users matching ada");
        // 12 rows, a separator after row 10, two summaries
        assert_eq!(lines.len(), 15);
        assert_eq!(lines[12], "");
        assert!(lines[1].starts_with("   0 "));
        assert!(lines[1].ends_with("ada0@b.com"));

        assert_eq!(
            user_listing(&[], "nobody"),
            vec!["found 0 users matching nobody", "found 0 users matching nobody"]
        );
    }

    #[tokio::test]
    async fn verbose_raw_request_is_sent_once() {
        let transport = FakeTransport::new()
            .reply(200, r#"{"access":{"token":"T"}}"#)
            .reply(204, "");
        execute(&cli(&["-v", "raw", "delete", "/api/v1/things/3"]), &transport, &mut source())
            .await
            .unwrap();

        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].method, Method::DELETE);
        assert_eq!(sent[1].headers[AUTHORIZATION], "Bearer T");
    }

    #[test]
    fn user_response_decodes_partial_records() {
        let user: UserResponse = serde_json::from_str(
            r#"{"id": 4, "first_name": "Ada", "last_name": "Lovelace", "email": "ada@b.com", "root": true}"#,
        )
        .unwrap();
        assert_eq!(user.id, 4);
        assert_eq!(user.first_name, "Ada");
        assert!(user.root);
        assert_eq!(user.avatar_url, None);
    }

    #[tokio::test]
    async fn ping_needs_no_login() {
        let transport = FakeTransport::new().reply(200, "\"pong\"");
        execute(&cli(&["ping"]), &transport, &mut source())
            .await
            .unwrap();

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].url.as_str(), "http://svc/api/v1/ping");
        assert!(sent[0].headers.get(AUTHORIZATION).is_none());
    }

    #[tokio::test]
    async fn me_logs_in_then_reads_account() {
        let transport = FakeTransport::new()
            .reply(200, r#"{"access":{"token":"T"}}"#)
            .reply(200, r#"{"id": 1, "first_name": "Ada"}"#);
        execute(&cli(&["me"]), &transport, &mut source())
            .await
            .unwrap();

        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].url.path(), "/api/v1/auth/token");
        assert_eq!(sent[1].url.path(), ACCOUNT_PATH);
        assert_eq!(sent[1].headers[AUTHORIZATION], "Bearer T");
    }

    #[tokio::test]
    async fn rejected_login_surfaces_at_next_call() {
        let transport = FakeTransport::new()
            .reply(401, r#"{"error":"bad credentials"}"#)
            .reply(401, r#"{"error":"unauthorized"}"#);
        let err = execute(&cli(&["me"]), &transport, &mut source())
            .await
            .unwrap_err();

        assert_eq!(transport.sent().len(), 2);
        assert!(err.to_string().contains("401"), "{err}");
    }

    #[tokio::test]
    async fn find_encodes_query() {
        let transport = FakeTransport::new()
            .reply(200, r#"{"access":{"token":"T"}}"#)
            .reply(200, r#"[{"id": 1, "email": "ann@b.com"}, {"id": 2}]"#);
        execute(&cli(&["user", "find", "ann b"]), &transport, &mut source())
            .await
            .unwrap();

        let find = &transport.sent()[1];
        assert_eq!(find.url.path(), USER_FIND_PATH);
        assert_eq!(find.url.query(), Some("query=ann+b"));
    }

    #[tokio::test]
    async fn upload_of_missing_file_fails_before_login() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.zip");
        let transport = FakeTransport::new();
        let err = execute(
            &cli(&["submission", "upload", "1", "2", "3", missing.to_str().unwrap()]),
            &transport,
            &mut source(),
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains("does not exist"), "{err}");
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn upload_posts_submission() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("solution.zip");
        std::fs::write(&file, b"zip").unwrap();
        let transport = FakeTransport::new()
            .reply(200, r#"{"access":{"token":"T"}}"#)
            .reply(201, "");
        execute(
            &cli(&["submission", "upload", "1", "2", "3", file.to_str().unwrap()]),
            &transport,
            &mut source(),
        )
        .await
        .unwrap();

        let sent = transport.sent();
        assert_eq!(sent[1].method, Method::POST);
        assert_eq!(sent[1].url.path(), "/api/v1/courses/1/tasks/2/submission");
        assert_eq!(sent[1].headers[AUTHORIZATION], "Bearer T");
        let body = String::from_utf8_lossy(sent[1].body.as_deref().unwrap()).into_owned();
        assert!(body.contains("name=\"user_id\"\r\n\r\n3\r\n"), "{body}");
        assert!(body.contains("filename=\"solution.zip\""), "{body}");
    }

    #[tokio::test]
    async fn raw_verbs_send_json_bodies() {
        let transport = FakeTransport::new()
            .reply(200, r#"{"access":{"token":"T"}}"#)
            .reply(204, "");
        execute(
            &cli(&["raw", "patch", "/api/v1/courses/1", "name=Graphics", "visible:=true"]),
            &transport,
            &mut source(),
        )
        .await
        .unwrap();

        let patch = &transport.sent()[1];
        assert_eq!(patch.method, Method::PATCH);
        let body: serde_json::Value =
            serde_json::from_slice(patch.body.as_deref().unwrap()).unwrap();
        assert_eq!(body, serde_json::json!({"name": "Graphics", "visible": true}));
    }

    #[tokio::test]
    async fn raw_delete_has_no_body() {
        let transport = FakeTransport::new()
            .reply(200, r#"{"access":{"token":"T"}}"#)
            .reply(200, "{}");
        execute(
            &cli(&["raw", "delete", "/api/v1/courses/1"]),
            &transport,
            &mut source(),
        )
        .await
        .unwrap();

        let delete = &transport.sent()[1];
        assert_eq!(delete.method, Method::DELETE);
        assert!(delete.body.is_none());
        assert_eq!(delete.headers[AUTHORIZATION], "Bearer T");
    }
}
