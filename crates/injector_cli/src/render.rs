//! Plain-text output of the CLI. Everything here returns strings so the
//! formatting can be snapshot-tested.

use std::fmt::Write;

use injector_client::{Applied, ChangeEnvelope, ProjectItem, ProjectPage, SecretItem};

pub fn render_projects(projects: &[ProjectItem]) -> String {
    if projects.is_empty() {
        return "No projects\n".to_string();
    }
    let width = projects.iter().map(|p| p.id.len()).max().unwrap_or(0);
    let mut out = String::new();
    for project in projects {
        let _ = write!(out, "{:<width$}  {}", project.id, project.name, width = width);
        if let Some(description) = &project.description {
            let _ = write!(out, "  ({})", description);
        }
        out.push('\n');
    }
    out
}

pub fn render_project_page(page: &ProjectPage, reveal: bool) -> String {
    let project = &page.project;
    let mut out = String::new();
    let _ = writeln!(out, "{} ({})", project.name, project.id);
    if let Some(description) = &project.description {
        let _ = writeln!(out, "{}", description);
    }
    let _ = writeln!(
        out,
        "created {}, updated {}",
        project.created_at, project.updated_at
    );
    if page.secrets.is_empty() {
        out.push_str("\nNo secrets\n");
        return out;
    }
    let _ = writeln!(out, "\n{} secret(s):", page.secrets.len());
    let width = page.secrets.iter().map(|s| s.key.len()).max().unwrap_or(0);
    for secret in &page.secrets {
        let value = if reveal {
            secret.value.clone()
        } else {
            secret.masked_value()
        };
        let _ = write!(out, "  {:<width$} = {}", secret.key, value, width = width);
        if let Some(description) = &secret.description {
            let _ = write!(out, "  # {}", description);
        }
        out.push('\n');
    }
    out
}

pub fn describe_project(project: &ProjectItem) -> String {
    format!("project {} {}", project.id, project.name)
}

/// Secret values are never printed by the watcher.
pub fn describe_secret(secret: &SecretItem) -> String {
    format!(
        "secret {} {} (project {})",
        secret.id, secret.key, secret.project_id
    )
}

/// One line for an applied change, `None` when nothing changed.
pub fn render_change<T>(
    envelope: &ChangeEnvelope<T>,
    applied: Applied,
    describe: impl Fn(&T) -> String,
) -> Option<String> {
    let data = envelope.change.data()?;
    let action = match applied {
        Applied::Inserted => "added",
        Applied::Replaced => "updated",
        Applied::Removed => "removed",
        Applied::Ignored => return None,
    };
    let timestamp = envelope
        .timestamp
        .as_ref()
        .map(|t| t.as_str())
        .unwrap_or("-");
    Some(format!(
        "{} {:<6} {:<7} {}",
        timestamp,
        envelope.change.kind().as_str(),
        action,
        describe(data)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use expect_test::expect;
    use injector_client::{Change, Timestamp};

    fn project(id: &str, name: &str, description: Option<&str>) -> ProjectItem {
        ProjectItem {
            id: id.to_string(),
            name: name.to_string(),
            description: description.map(str::to_string),
            created_at: Timestamp::new("2025-01-02T10:00:00Z"),
            updated_at: Timestamp::new("2025-01-03T09:15:00Z"),
        }
    }

    fn secret(id: &str, key: &str, value: &str, description: Option<&str>) -> SecretItem {
        SecretItem {
            id: id.to_string(),
            project_id: "p1".to_string(),
            description: description.map(str::to_string),
            key: key.to_string(),
            value: value.to_string(),
            created_at: Timestamp::new("2025-01-02T10:00:00Z"),
            updated_at: Timestamp::new("2025-01-02T10:00:00Z"),
        }
    }

    fn page() -> ProjectPage {
        ProjectPage {
            project: project("p1", "web", Some("Public website")),
            secrets: vec![
                secret("s1", "DATABASE_URL", "postgres://db/web", Some("primary")),
                secret("s2", "TOKEN", "abc", None),
            ],
        }
    }

    #[test]
    fn test_render_projects() {
        let projects = vec![
            project("p1", "web", Some("Public website")),
            project("p10", "billing", None),
        ];
        expect![[r#"
            p1   web  (Public website)
            p10  billing
        "#]]
        .assert_eq(&render_projects(&projects));
        assert_eq!(render_projects(&[]), "No projects\n");
    }

    #[test]
    fn test_render_project_page_masked() {
        expect![[r#"
            web (p1)
            Public website
            created 2025-01-02T10:00:00Z, updated 2025-01-03T09:15:00Z

            2 secret(s):
              DATABASE_URL = ********  # primary
              TOKEN        = ***
        "#]]
        .assert_eq(&render_project_page(&page(), false));
    }

    #[test]
    fn test_render_project_page_revealed() {
        let rendered = render_project_page(&page(), true);
        assert!(rendered.contains("DATABASE_URL = postgres://db/web  # primary"));
        assert!(rendered.contains("TOKEN        = abc"));
    }

    #[test]
    fn test_render_change_lines() {
        let envelope = ChangeEnvelope {
            timestamp: Some(Timestamp::new("2025-01-02T10:00:01Z")),
            change: Change::Update(secret("s2", "TOKEN", "abc", None)),
        };
        let line = render_change(&envelope, Applied::Replaced, describe_secret).unwrap();
        expect!["2025-01-02T10:00:01Z update updated secret s2 TOKEN (project p1)"].assert_eq(&line);
        assert!(!line.contains("abc"));

        assert_eq!(
            render_change(&envelope, Applied::Ignored, describe_secret),
            None
        );
        let ping: ChangeEnvelope<SecretItem> = ChangeEnvelope {
            timestamp: None,
            change: Change::Ping,
        };
        assert_eq!(render_change(&ping, Applied::Ignored, describe_secret), None);
    }
}
