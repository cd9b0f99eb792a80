// ABOUTME: Database artifact naming and database CLI command construction
// ABOUTME: Covers export/delete/add/import through the admin CLI and table listing/dropping through the SQL client

use chrono::{DateTime, FixedOffset};
use std::path::{Path, PathBuf};

use crate::command::CommandSpec;
use crate::config::Secret;

/// The compressed dump that travels from source to destination.
///
/// The file name depends only on the source database name, so the export,
/// transport and import stages can never disagree about which file they handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpArtifact {
    file_name: String,
}

impl DumpArtifact {
    pub fn for_database(database_name: &str) -> Self {
        Self {
            file_name: format!("{}.sql.gz", database_name),
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn path_in(&self, dir: &Path) -> PathBuf {
        dir.join(&self.file_name)
    }
}

pub fn backup_file_name(database_name: &str, at: &DateTime<FixedOffset>) -> String {
    format!("{}-{}.sql.gz", database_name, at.format("%Y-%m-%d_%H-%M-%S"))
}

/// Builds invocations of the database administration CLI.
pub struct DatabaseCli {
    program: String,
}

impl DatabaseCli {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
        }
    }

    pub fn export(&self, database: &str, file: &Path) -> CommandSpec {
        CommandSpec::new(&self.program)
            .arg("db:export")
            .arg(format!("--databaseName={}", database))
            .arg(format!("--file={}", file.display()))
    }

    pub fn delete(&self, database: &str) -> CommandSpec {
        CommandSpec::new(&self.program)
            .arg("db:delete")
            .arg(format!("--databaseName={}", database))
            .arg("--force")
    }

    pub fn add(&self, domain: &str, database: &str, user: &str, password: &Secret) -> CommandSpec {
        CommandSpec::new(&self.program)
            .arg("db:add")
            .arg(format!("--domainName={}", domain))
            .arg(format!("--databaseName={}", database))
            .arg(format!("--databaseUserName={}", user))
            .arg(format!("--databaseUserPassword={}", password.expose()))
            .redacting(password.expose())
    }

    pub fn import(&self, database: &str, file: &Path) -> CommandSpec {
        CommandSpec::new(&self.program)
            .arg("db:import")
            .arg(format!("--databaseName={}", database))
            .arg(format!("--file={}", file.display()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Table,
    View,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableEntry {
    pub name: String,
    pub kind: TableKind,
}

/// Builds invocations of the local SQL client, relying on its own credential files.
pub struct SqlClient {
    program: String,
}

impl SqlClient {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
        }
    }

    pub fn list_tables(&self, database: &str) -> CommandSpec {
        CommandSpec::new(&self.program)
            .args(["--batch", "--raw", "--skip-column-names", "-e", "SHOW FULL TABLES"])
            .arg(database)
    }

    /// One statement list that drops everything with foreign key checks off.
    pub fn drop_tables(&self, database: &str, entries: &[TableEntry]) -> CommandSpec {
        CommandSpec::new(&self.program)
            .args(["--batch", "-e"])
            .arg(drop_statement(entries))
            .arg(database)
    }
}

/// Parses `SHOW FULL TABLES` raw batch output (`name<TAB>type` per line).
pub fn parse_table_list(stdout: &str) -> Vec<TableEntry> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut columns = line.split('\t');
            let name = columns.next()?.trim();
            if name.is_empty() {
                return None;
            }
            let kind = match columns.next().map(str::trim) {
                Some("VIEW") => TableKind::View,
                _ => TableKind::Table,
            };
            Some(TableEntry {
                name: name.to_string(),
                kind,
            })
        })
        .collect()
}

pub fn drop_statement(entries: &[TableEntry]) -> String {
    let join = |kind: TableKind| {
        entries
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| quote_identifier(&e.name))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let views = join(TableKind::View);
    let tables = join(TableKind::Table);

    let mut sql = String::from("SET FOREIGN_KEY_CHECKS=0;");
    if !views.is_empty() {
        sql.push_str(&format!(" DROP VIEW IF EXISTS {};", views));
    }
    if !tables.is_empty() {
        sql.push_str(&format!(" DROP TABLE IF EXISTS {};", tables));
    }
    sql.push_str(" SET FOREIGN_KEY_CHECKS=1;");
    sql
}

fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}
