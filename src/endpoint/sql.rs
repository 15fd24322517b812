//! SQL statement builders
//!
//! Administrative statements (accounts, grants, replication control) cannot
//! take bound parameters, so values are inlined with explicit quoting.

use std::borrow::Cow;

use super::{ReplicationCredential, ReplicationSource};

/// Table holding blog records
pub const BLOG_TABLE: &str = "blogs";

pub const FLUSH_PRIVILEGES: &str = "FLUSH PRIVILEGES";
pub const SHOW_MASTER_STATUS: &str = "SHOW MASTER STATUS";
pub const SHOW_SLAVE_STATUS: &str = "SHOW SLAVE STATUS";
pub const STOP_SLAVE: &str = "STOP SLAVE";
pub const START_SLAVE: &str = "START SLAVE";

pub const INSERT_BLOG: &str = "INSERT INTO `blogs` (`data`) VALUES (?)";
pub const DELETE_BLOG: &str = "DELETE FROM `blogs` WHERE `id` = ?";
pub const SELECT_BLOGS: &str =
    "SELECT `id`, CAST(`data` AS CHAR) AS `data`, `created_at` FROM `blogs` ORDER BY `id` DESC LIMIT ? OFFSET ?";

/// Quote an identifier with backticks
pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Quote a string literal with single quotes
pub fn quote_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\'' => out.push_str("''"),
            '\\' => out.push_str("\\\\"),
            '\0' => out.push_str("\\0"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

pub fn create_replication_user(credential: &ReplicationCredential) -> String {
    format!(
        "CREATE USER IF NOT EXISTS {}@'%' IDENTIFIED BY {}",
        quote_literal(&credential.username),
        quote_literal(&credential.password)
    )
}

pub fn grant_replication(credential: &ReplicationCredential) -> String {
    format!(
        "GRANT REPLICATION SLAVE ON *.* TO {}@'%'",
        quote_literal(&credential.username)
    )
}

pub fn create_database(database: &str) -> String {
    format!("CREATE DATABASE IF NOT EXISTS {}", quote_ident(database))
}

pub fn create_blog_table() -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\
         `id` BIGINT AUTO_INCREMENT PRIMARY KEY, \
         `data` JSON NOT NULL, \
         `created_at` TIMESTAMP DEFAULT CURRENT_TIMESTAMP)",
        quote_ident(BLOG_TABLE)
    )
}

pub fn change_master(source: &ReplicationSource) -> String {
    format!(
        "CHANGE MASTER TO MASTER_HOST={}, MASTER_PORT={}, MASTER_USER={}, MASTER_PASSWORD={}, \
         MASTER_LOG_FILE={}, MASTER_LOG_POS={}",
        quote_literal(&source.host),
        source.port,
        quote_literal(&source.credential.username),
        quote_literal(&source.credential.password),
        quote_literal(&source.position.file),
        source.position.position
    )
}

/// Keywords directly followed by a secret literal
const SECRET_MARKERS: [&str; 2] = ["IDENTIFIED BY ", "MASTER_PASSWORD="];

/// Truncate a statement for logging
pub fn preview(stmt: &str) -> &str {
    truncate(stmt, 100)
}

/// First `max_chars` characters of `stmt`
pub fn truncate(stmt: &str, max_chars: usize) -> &str {
    match stmt.char_indices().nth(max_chars) {
        Some((i, _)) => &stmt[..i],
        None => stmt,
    }
}

/// Replace password literals with `'***'`
pub fn redact(stmt: &str) -> Cow<'_, str> {
    let mut out = String::new();
    let mut rest = stmt;

    while let Some((at, marker_len)) = SECRET_MARKERS
        .iter()
        .filter_map(|m| rest.find(m).map(|i| (i, m.len())))
        .min()
    {
        let start = at + marker_len;
        out.push_str(&rest[..start]);
        out.push_str("'***'");
        rest = &rest[start + literal_len(&rest[start..])..];
    }

    if out.is_empty() {
        return Cow::Borrowed(stmt);
    }
    out.push_str(rest);
    Cow::Owned(out)
}

/// Byte length of the value at the start of `s`, quoted as by [`quote_literal`]
fn literal_len(s: &str) -> usize {
    let mut chars = s.char_indices().peekable();
    if !matches!(chars.next(), Some((_, '\''))) {
        return s.find(|c: char| c == ',' || c == ' ').unwrap_or(s.len());
    }

    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => {
                chars.next();
            }
            '\'' => {
                if matches!(chars.peek(), Some((_, '\''))) {
                    chars.next();
                } else {
                    return i + 1;
                }
            }
            _ => {}
        }
    }
    s.len()
}

/// Short, password-free excerpt of a failed statement for error messages
pub fn statement_context(stmt: &str) -> String {
    truncate(&redact(stmt), 50).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::LogPosition;

    fn credential() -> ReplicationCredential {
        ReplicationCredential {
            username: "replicator".to_string(),
            password: "pa'ss".to_string(),
        }
    }

    #[test]
    fn test_quoting() {
        assert_eq!(quote_ident("blogdb"), "`blogdb`");
        assert_eq!(quote_ident("we`ird"), "`we``ird`");
        assert_eq!(quote_literal("it's"), "'it''s'");
        assert_eq!(quote_literal(r"a\b"), r"'a\\b'");
    }

    #[test]
    fn test_account_statements() {
        let sql = create_replication_user(&credential());
        assert_eq!(
            sql,
            "CREATE USER IF NOT EXISTS 'replicator'@'%' IDENTIFIED BY 'pa''ss'"
        );
        assert_eq!(
            grant_replication(&credential()),
            "GRANT REPLICATION SLAVE ON *.* TO 'replicator'@'%'"
        );
    }

    #[test]
    fn test_schema_statements_are_idempotent() {
        assert_eq!(create_database("blogdb"), "CREATE DATABASE IF NOT EXISTS `blogdb`");
        let table = create_blog_table();
        assert!(table.starts_with("CREATE TABLE IF NOT EXISTS `blogs`"));
        assert!(table.contains("`data` JSON NOT NULL"));
    }

    #[test]
    fn test_change_master() {
        let source = ReplicationSource {
            host: "mysql-master".to_string(),
            port: 3306,
            credential: credential(),
            position: LogPosition {
                file: "mysql-bin.000003".to_string(),
                position: 1547,
            },
        };

        let sql = change_master(&source);
        assert!(sql.starts_with("CHANGE MASTER TO MASTER_HOST='mysql-master'"));
        assert!(sql.contains("MASTER_PORT=3306"));
        assert!(sql.contains("MASTER_PASSWORD='pa''ss'"));
        assert!(sql.ends_with("MASTER_LOG_FILE='mysql-bin.000003', MASTER_LOG_POS=1547"));
    }

    #[test]
    fn test_preview() {
        let long = "x".repeat(250);
        assert_eq!(preview(&long).len(), 100);
        assert_eq!(preview("SELECT 1"), "SELECT 1");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let cred = ReplicationCredential {
            username: "ü".repeat(12),
            password: "x".to_string(),
        };
        let stmt = create_replication_user(&cred);
        // Byte 50 falls inside a two-byte character
        assert!(!stmt.is_char_boundary(50));

        let context = statement_context(&stmt);
        assert_eq!(context.chars().count(), 50);
        assert!(context.starts_with("CREATE USER IF NOT EXISTS 'üü"));
    }

    #[test]
    fn test_redact_account_statement() {
        let cred = ReplicationCredential {
            username: "replicator".to_string(),
            password: "replpass".to_string(),
        };
        let stmt = create_replication_user(&cred);

        let redacted = redact(&stmt);
        assert_eq!(
            redacted,
            "CREATE USER IF NOT EXISTS 'replicator'@'%' IDENTIFIED BY '***'"
        );
        assert!(!preview(&redacted).contains("replpass"));

        // Short names put the password inside the error excerpt
        let short = create_replication_user(&ReplicationCredential {
            username: "r".to_string(),
            password: "replpass".to_string(),
        });
        let context = statement_context(&short);
        assert_eq!(context, "CREATE USER IF NOT EXISTS 'r'@'%' IDENTIFIED BY '*");
        assert!(!context.contains("'re"));
    }

    #[test]
    fn test_redact_change_master() {
        let source = ReplicationSource {
            host: "m".to_string(),
            port: 3306,
            credential: ReplicationCredential {
                username: "u".to_string(),
                password: "it's, a \\secret".to_string(),
            },
            position: LogPosition {
                file: "mysql-bin.000001".to_string(),
                position: 4,
            },
        };

        let statement = change_master(&source);
        let redacted = redact(&statement);
        assert!(!redacted.contains("secret"));
        assert!(redacted.contains("MASTER_PASSWORD='***', MASTER_LOG_FILE='mysql-bin.000001'"));
        assert!(!statement_context(&change_master(&source)).contains("secret"));
    }

    #[test]
    fn test_redact_leaves_plain_statements() {
        assert!(matches!(redact(STOP_SLAVE), Cow::Borrowed(_)));
        assert_eq!(redact(&grant_replication(&credential())), grant_replication(&credential()));
    }
}
