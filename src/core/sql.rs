//! SQL text helpers for database creation

use super::config::ConnectionConfig;

/// Prefix every occurrence of `escaped` in `s` with a backslash
pub fn escape(s: &str, escaped: char) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c == escaped {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Connection string understood by the driver's attach call: `server:path` or `path`
pub fn connection_string(server: &str, database: &str) -> String {
    if server.is_empty() {
        database.to_string()
    } else {
        format!("{}:{}", server, database)
    }
}

/// Build the `CREATE DATABASE` statement for `config`
pub fn create_database_statement(config: &ConnectionConfig) -> String {
    let mut create = String::from("CREATE DATABASE \"");
    if !config.server.is_empty() {
        create.push_str(&config.server);
        create.push(':');
    }
    create.push_str(&escape(&config.database, '"'));
    create.push_str("\" ");

    create.push_str("USER '");
    create.push_str(&config.user);
    create.push_str("' ");
    if !config.password.is_empty() {
        create.push_str("PASSWORD '");
        create.push_str(&config.password);
        create.push_str("' ");
    }

    create.push_str(&config.create_params);
    create
}
