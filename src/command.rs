//! Post-completion command: variable substitution and execution.

use std::process::{ExitStatus, Stdio};

use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::{ForkError, Result};

/// Expand variables in a command template.
///
/// `^{NAME}` is first rewritten to `${NAME}`, then every `${NAME}` is
/// replaced by `lookup(NAME)`, or nothing if the variable is unset. An
/// unterminated `${` is kept literally.
pub fn substitute_variables<F>(template: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let unescaped = template.replace("^{", "${");
    let mut out = String::with_capacity(unescaped.len());
    let mut rest = unescaped.as_str();

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                if let Some(value) = lookup(&after[..end]) {
                    out.push_str(&value);
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Run a command through `/bin/sh -c`, discarding its output.
pub async fn run_post_command(command: &str) -> Result<ExitStatus> {
    let status = Command::new("/bin/sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map_err(|e| ForkError::PostCommand(format!("cannot spawn: {e}")))?;

    if status.success() {
        Ok(status)
    } else {
        Err(ForkError::PostCommand(format!("exited with {status}")))
    }
}

/// Run the command in the background. Failures are only logged.
pub fn spawn_post_command(command: String) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(command = %command, "Executing post-completion command");
        if let Err(e) = run_post_command(&command).await {
            warn!(command = %command, error = %e, "Post-completion command failed");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars() -> HashMap<String, String> {
        HashMap::from([
            ("UNIQUEID".to_string(), "1700000000.42".to_string()),
            ("EXTEN".to_string(), "600".to_string()),
        ])
    }

    #[test]
    fn test_substitute_caret_and_dollar() {
        let vars = vars();
        let out = substitute_variables("/usr/bin/notify ^{UNIQUEID} ${EXTEN}", |k| {
            vars.get(k).cloned()
        });
        assert_eq!(out, "/usr/bin/notify 1700000000.42 600");
    }

    #[test]
    fn test_unknown_variable_is_empty() {
        let out = substitute_variables("echo [${MISSING}]", |_| None);
        assert_eq!(out, "echo []");
    }

    #[test]
    fn test_unterminated_is_literal() {
        let out = substitute_variables("echo ${OPEN", |_| Some("x".into()));
        assert_eq!(out, "echo ${OPEN");
    }

    #[test]
    fn test_plain_text_untouched() {
        let out = substitute_variables("echo done", |_| Some("x".into()));
        assert_eq!(out, "echo done");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_post_command_status() {
        assert!(run_post_command("exit 0").await.is_ok());
        assert!(matches!(
            run_post_command("exit 3").await,
            Err(ForkError::PostCommand(_))
        ));
    }
}
