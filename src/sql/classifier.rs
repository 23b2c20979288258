//! Statement classification
//!
//! Keyword sniffing, kept in one place. The classifier skips leading `--` and
//! `/* */` comments, takes the leading run of letters (case-folded) as the
//! verb to decide the statement kind and,
//! for DML, at the token following the first `FROM` or `INTO` to find the
//! table. It does not understand joins, subqueries or `UPDATE <table> SET`;
//! a statement without a `FROM`/`INTO` table reference is simply not routed.

/// DDL verbs that never go through the shard router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DdlVerb {
    Create,
    Drop,
    Alter,
    Truncate,
    Rename,
}

impl DdlVerb {
    /// CREATE and DROP may only originate at the primary.
    pub fn is_master_only(&self) -> bool {
        matches!(self, DdlVerb::Create | DdlVerb::Drop)
    }
}

/// What a statement does, judged by its leading keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Ddl(DdlVerb),
    Use,
    Other,
}

impl StatementKind {
    /// DML kinds that consult the shard router when they name a table.
    pub fn is_routable(&self) -> bool {
        matches!(
            self,
            StatementKind::Select
                | StatementKind::Insert
                | StatementKind::Update
                | StatementKind::Delete
        )
    }

    pub fn is_master_only(&self) -> bool {
        matches!(self, StatementKind::Ddl(verb) if verb.is_master_only())
    }

    pub fn is_ddl(&self) -> bool {
        matches!(self, StatementKind::Ddl(_))
    }

    pub fn is_read(&self) -> bool {
        matches!(self, StatementKind::Select)
    }
}

/// Result of [`classify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedStatement {
    pub kind: StatementKind,
    /// Table named after the first `FROM`/`INTO`, for routable kinds only
    pub table: Option<String>,
}

impl ClassifiedStatement {
    /// Whether the shard router decides where this statement runs.
    pub fn needs_routing(&self) -> bool {
        self.kind.is_routable() && self.table.is_some()
    }
}

/// Database-level commands the storage adapter handles itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseCommand {
    Create { name: String, if_not_exists: bool },
    Drop { name: String, if_exists: bool },
    Use(String),
}

impl DatabaseCommand {
    /// Commands that run without a selected database.
    pub fn is_database_lifecycle(&self) -> bool {
        matches!(
            self,
            DatabaseCommand::Create { .. } | DatabaseCommand::Drop { .. }
        )
    }
}

/// Statement text after leading whitespace and comments.
///
/// An unterminated comment swallows the rest of the text.
pub fn skip_leading_comments(statement: &str) -> &str {
    let mut rest = statement.trim_start();
    loop {
        if let Some(comment) = rest.strip_prefix("--") {
            rest = comment.find('\n').map_or("", |end| &comment[end + 1..]);
        } else if let Some(comment) = rest.strip_prefix("/*") {
            rest = comment.find("*/").map_or("", |end| &comment[end + 2..]);
        } else {
            return rest;
        }
        rest = rest.trim_start();
    }
}

/// Classify a statement by its leading keyword.
pub fn classify(statement: &str) -> ClassifiedStatement {
    let statement = skip_leading_comments(statement);
    let verb: String = statement
        .chars()
        .take_while(char::is_ascii_alphabetic)
        .map(|c| c.to_ascii_uppercase())
        .collect();

    let kind = match verb.as_str() {
        "SELECT" => StatementKind::Select,
        "INSERT" => StatementKind::Insert,
        "UPDATE" => StatementKind::Update,
        "DELETE" => StatementKind::Delete,
        "CREATE" => StatementKind::Ddl(DdlVerb::Create),
        "DROP" => StatementKind::Ddl(DdlVerb::Drop),
        "ALTER" => StatementKind::Ddl(DdlVerb::Alter),
        "TRUNCATE" => StatementKind::Ddl(DdlVerb::Truncate),
        "RENAME" => StatementKind::Ddl(DdlVerb::Rename),
        "USE" => StatementKind::Use,
        _ => StatementKind::Other,
    };

    let table = if kind.is_routable() {
        table_reference(statement)
    } else {
        None
    };

    ClassifiedStatement { kind, table }
}

/// Token after the first `FROM` or `INTO`, stripped of quoting and of any
/// column list or terminator glued to it.
fn table_reference(statement: &str) -> Option<String> {
    let mut tokens = statement.split_whitespace();
    tokens.find(|token| {
        token.eq_ignore_ascii_case("FROM") || token.eq_ignore_ascii_case("INTO")
    })?;

    let raw = tokens.next()?;
    let end = raw.find(&['(', ',', ';', ')'][..]).unwrap_or(raw.len());
    let table = raw[..end].trim_matches(|c| c == '`' || c == '"' || c == '\'');

    if table.is_empty() {
        None
    } else {
        Some(table.to_string())
    }
}

/// Recognize `CREATE DATABASE`, `DROP DATABASE` and `USE` (with `SCHEMA` as a
/// synonym of `DATABASE`).
pub fn database_command(statement: &str) -> Option<DatabaseCommand> {
    let tokens: Vec<&str> = skip_leading_comments(statement)
        .split_whitespace()
        .map(|token| token.trim_end_matches(';'))
        .filter(|token| !token.is_empty())
        .collect();
    let upper: Vec<String> = tokens.iter().map(|t| t.to_ascii_uppercase()).collect();
    let keyword = |i: usize, word: &str| upper.get(i).map(String::as_str) == Some(word);
    let name_at = |i: usize| {
        tokens
            .get(i)
            .map(|t| t.trim_matches('`').to_string())
            .filter(|n| !n.is_empty())
    };

    if keyword(0, "USE") && tokens.len() == 2 {
        return name_at(1).map(DatabaseCommand::Use);
    }

    let is_database = keyword(1, "DATABASE") || keyword(1, "SCHEMA");
    if keyword(0, "CREATE") && is_database {
        let if_not_exists = keyword(2, "IF") && keyword(3, "NOT") && keyword(4, "EXISTS");
        let name = name_at(if if_not_exists { 5 } else { 2 })?;
        return Some(DatabaseCommand::Create {
            name,
            if_not_exists,
        });
    }

    if keyword(0, "DROP") && is_database {
        let if_exists = keyword(2, "IF") && keyword(3, "EXISTS");
        let name = name_at(if if_exists { 4 } else { 2 })?;
        return Some(DatabaseCommand::Drop { name, if_exists });
    }

    None
}

/// Database and shard names: ASCII letters, digits, `_` and `$`, at most 64
/// characters.
pub fn is_valid_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 64
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}
