/* 📖 # Why normalize secret keys?

Secrets are stored under whatever key the user typed ("api key",
"databaseUrl", "stripe-secret"). Environment variables are conventionally
SCREAMING_SNAKE_CASE and some shells reject anything else, so keys are
normalized before a child process sees them. Two keys can normalize to the
same name; the later secret wins and the collision is logged (without values).
*/

use std::ffi::OsStr;
use std::process::{Command, ExitStatus};

use tracing::{info, warn};

use injector_base::error::ErrorKind;
use injector_base::{InjectorError, InjectorResult};

use crate::model::SecretItem;

/// `"databaseUrl"` → `"DATABASE_URL"`, `"api-key "` → `"API_KEY"`.
pub fn to_screaming_snake_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    let mut previous: Option<char> = None;
    for c in key.chars() {
        let c = if c == ' ' || c == '-' { '_' } else { c };
        if c.is_ascii_uppercase()
            && previous.is_some_and(|p| p.is_ascii_lowercase() || p.is_ascii_digit())
        {
            out.push('_');
        }
        for upper in c.to_uppercase() {
            if upper == '_' && out.ends_with('_') {
                continue;
            }
            out.push(upper);
        }
        previous = Some(c);
    }
    out.trim_matches('_').to_string()
}

/// Environment variables for `secrets`, in first-seen order of their names.
pub fn build_environment(secrets: &[SecretItem]) -> Vec<(String, String)> {
    let mut env: Vec<(String, String)> = Vec::with_capacity(secrets.len());
    for secret in secrets {
        let name = to_screaming_snake_case(&secret.key);
        if name.is_empty() {
            warn!(secret_id = %secret.id, key = %secret.key, "skipping secret with an unusable key");
            continue;
        }
        match env.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => {
                warn!(name = %name, secret_id = %secret.id, "secret overrides an earlier one with the same name");
                entry.1 = secret.value.clone();
            }
            None => env.push((name, secret.value.clone())),
        }
    }
    env
}

/// Run `program` with `env` added to the inherited environment and wait for it.
pub fn run_with_environment<S: AsRef<OsStr>>(
    program: &str,
    args: &[S],
    env: &[(String, String)],
) -> InjectorResult<ExitStatus> {
    info!(program, variables = env.len(), "running program with injected secrets");
    Command::new(program)
        .args(args)
        .envs(env.iter().map(|(name, value)| (name, value)))
        .status()
        .map_err(|source| {
            Box::new(
                InjectorError::new(ErrorKind::FileError {
                    path: program.into(),
                    source,
                })
                .context(format!("Failed to run {}", program)),
            )
        })
}
