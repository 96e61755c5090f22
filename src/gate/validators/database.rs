//! Database client validators
//!
//! Dropping databases or users is limited to names that look like test or
//! development fixtures. SQL and shell scripts passed inline are scanned for
//! destructive statements; interactive sessions cannot be inspected and are
//! allowed.

use crate::gate::validators::{each_invocation, CommandValidator, ValidationContext};
use crate::gate::Verdict;
use regex::Regex;
use std::sync::LazyLock;

static DESTRUCTIVE_SQL: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\bDROP\s+(DATABASE|SCHEMA|TABLE|INDEX|VIEW|FUNCTION|PROCEDURE|TRIGGER)\b",
        r"(?i)\bTRUNCATE\s+(TABLE\s+)?\w+",
        // DELETE without a WHERE clause
        r"(?i)\bDELETE\s+FROM\s+[\w.]+\s*(;|$)",
        r"(?i)\bDROP\s+ALL\b",
        r"(?i)\bDESTROY\b",
    ]
    .into_iter()
    .map(|pattern| Regex::new(pattern).expect("destructive SQL pattern compilation failed"))
    .collect()
});

static DESTRUCTIVE_MONGO: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\.dropDatabase\s*\(",
        r"(?i)\.drop\s*\(",
        r"(?i)\.deleteMany\s*\(\s*\{\s*\}\s*\)",
        r"(?i)\.remove\s*\(\s*\{\s*\}\s*\)",
        r"(?i)db\.dropAllUsers\s*\(",
        r"(?i)db\.dropAllRoles\s*\(",
    ]
    .into_iter()
    .map(|pattern| Regex::new(pattern).expect("mongo pattern compilation failed"))
    .collect()
});

/// Return the first destructive statement found in `sql`, upper-cased
pub fn destructive_sql(sql: &str) -> Option<String> {
    let upper = sql.to_uppercase();
    DESTRUCTIVE_SQL
        .iter()
        .find_map(|regex| regex.find(&upper))
        .map(|found| found.as_str().to_string())
}

/// Values of an option given as `-x VALUE`, `-xVALUE`, `--long VALUE` or
/// `--long=VALUE`, in order of appearance
fn option_values(args: &[String], short: Option<&str>, long: &str) -> Vec<String> {
    let long_eq = format!("{}=", long);
    let mut values = Vec::new();
    let mut args = args.iter();

    while let Some(arg) = args.next() {
        if arg == long || short == Some(arg.as_str()) {
            if let Some(value) = args.next() {
                values.push(value.clone());
            }
        } else if let Some(value) = arg.strip_prefix(&long_eq) {
            values.push(value.to_string());
        } else if let Some(value) = short.and_then(|s| arg.strip_prefix(s)) {
            if !arg.starts_with("--") && !value.is_empty() {
                values.push(value.to_string());
            }
        }
    }

    values
}

/// `dropdb` and `dropuser`: only fixture-like names
pub struct DropObjectValidator {
    command: &'static [&'static str],
    object: &'static str,
    plural: &'static str,
    options_with_value: &'static [&'static str],
    safe_prefixes: &'static [&'static str],
    safe_suffixes: &'static [&'static str],
    safe_summary: &'static str,
}

impl DropObjectValidator {
    pub fn dropdb() -> Self {
        Self {
            command: &["dropdb"],
            object: "a database name",
            plural: "databases",
            options_with_value: &[
                "-h", "--host", "-p", "--port", "-U", "--username", "-w", "--no-password", "-W",
                "--password", "--maintenance-db",
            ],
            safe_prefixes: &[
                "test", "dev", "local", "tmp", "temp", "scratch", "sandbox", "mock",
            ],
            safe_suffixes: &["_test", "_dev", "_local", "_tmp", "_temp", "_mock"],
            safe_summary:
                "test*, *_test, dev*, *_dev, local*, tmp*, temp*, scratch*, sandbox*, mock*",
        }
    }

    pub fn dropuser() -> Self {
        Self {
            command: &["dropuser"],
            object: "a username",
            plural: "users",
            options_with_value: &[
                "-h", "--host", "-p", "--port", "-U", "--username", "-w", "--no-password", "-W",
                "--password",
            ],
            safe_prefixes: &["test", "dev", "tmp", "temp", "mock"],
            safe_suffixes: &["_test", "_dev"],
            safe_summary: "test*, *_test, dev*, *_dev, tmp*, temp*, mock*",
        }
    }

    fn is_safe_name(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        self.safe_prefixes.iter().any(|p| lower.starts_with(p))
            || self.safe_suffixes.iter().any(|s| lower.ends_with(s))
    }
}

impl CommandValidator for DropObjectValidator {
    fn name(&self) -> &str {
        self.command[0]
    }

    fn commands(&self) -> &[&'static str] {
        self.command
    }

    fn validate(&self, segment: &str, _context: &ValidationContext) -> Verdict {
        let label = self.command[0];
        each_invocation(segment, self.commands(), label, |argv| {
            let mut target = None;
            let mut args = argv[1..].iter();
            while let Some(arg) = args.next() {
                if self.options_with_value.contains(&arg.as_str()) {
                    args.next();
                } else if !arg.starts_with('-') {
                    target = Some(arg);
                }
            }

            let target = match target {
                Some(target) => target,
                None => return Verdict::block(format!("{} requires {}", label, self.object)),
            };

            if self.is_safe_name(target) {
                return Verdict::Allow;
            }

            Verdict::block(format!(
                "{} '{}' blocked for safety. Only test/dev {} can be dropped autonomously. Safe patterns: {}",
                label, target, self.plural, self.safe_summary
            ))
        })
    }
}

/// `psql`, `mysql` and `mariadb`: inline SQL must not be destructive
pub struct SqlClientValidator {
    label: &'static str,
    command: &'static [&'static str],
    short: &'static str,
    long: &'static str,
}

impl SqlClientValidator {
    pub fn psql() -> Self {
        Self {
            label: "psql",
            command: &["psql"],
            short: "-c",
            long: "--command",
        }
    }

    pub fn mysql() -> Self {
        Self {
            label: "mysql",
            command: &["mysql", "mariadb"],
            short: "-e",
            long: "--execute",
        }
    }
}

impl CommandValidator for SqlClientValidator {
    fn name(&self) -> &str {
        self.label
    }

    fn commands(&self) -> &[&'static str] {
        self.command
    }

    fn validate(&self, segment: &str, _context: &ValidationContext) -> Verdict {
        each_invocation(segment, self.commands(), self.label, |argv| {
            for sql in option_values(&argv[1..], Some(self.short), self.long) {
                if let Some(matched) = destructive_sql(&sql) {
                    return Verdict::block(format!(
                        "{} command contains destructive SQL: '{}'. DROP/TRUNCATE/DELETE operations require manual confirmation.",
                        self.label, matched
                    ));
                }
            }

            Verdict::Allow
        })
    }
}

/// Redis commands that wipe data or reconfigure the server
pub const DANGEROUS_REDIS_COMMANDS: &[&str] = &[
    "FLUSHALL",
    "FLUSHDB",
    "DEBUG",
    "SHUTDOWN",
    "SLAVEOF",
    "REPLICAOF",
    "CONFIG",
    "BGSAVE",
    "BGREWRITEAOF",
    "CLUSTER",
];

/// `redis-cli`: the command verb must not be destructive
pub struct RedisCliValidator;

impl CommandValidator for RedisCliValidator {
    fn name(&self) -> &str {
        "redis-cli"
    }

    fn commands(&self) -> &[&'static str] {
        &["redis-cli"]
    }

    fn validate(&self, segment: &str, _context: &ValidationContext) -> Verdict {
        each_invocation(segment, self.commands(), "redis-cli", |argv| {
            let mut args = argv[1..].iter();
            while let Some(arg) = args.next() {
                if matches!(arg.as_str(), "-h" | "-p" | "-a" | "-n" | "--pass" | "--user" | "-u") {
                    args.next();
                    continue;
                }
                if arg.starts_with('-') {
                    continue;
                }

                let verb = arg.to_uppercase();
                if DANGEROUS_REDIS_COMMANDS.contains(&verb.as_str()) {
                    return Verdict::block(format!(
                        "redis-cli command '{}' is blocked for safety. Destructive Redis operations require manual confirmation.",
                        verb
                    ));
                }
                break;
            }

            Verdict::Allow
        })
    }
}

/// `mongosh` and `mongo`: `--eval` scripts must not drop or wipe data
pub struct MongoShellValidator;

impl CommandValidator for MongoShellValidator {
    fn name(&self) -> &str {
        "mongosh"
    }

    fn commands(&self) -> &[&'static str] {
        &["mongosh", "mongo"]
    }

    fn validate(&self, segment: &str, _context: &ValidationContext) -> Verdict {
        each_invocation(segment, self.commands(), "mongosh", |argv| {
            for script in option_values(&argv[1..], None, "--eval") {
                let destructive = DESTRUCTIVE_MONGO.iter().find_map(|regex| regex.find(&script));
                if let Some(found) = destructive {
                    return Verdict::block(format!(
                        "mongosh command contains destructive operation '{}'. Database drop/delete operations require manual confirmation.",
                        found.as_str()
                    ));
                }
            }

            Verdict::Allow
        })
    }
}

/// `mysqladmin`: no drop, shutdown or kill
pub struct MysqladminValidator;

impl CommandValidator for MysqladminValidator {
    fn name(&self) -> &str {
        "mysqladmin"
    }

    fn commands(&self) -> &[&'static str] {
        &["mysqladmin"]
    }

    fn validate(&self, segment: &str, _context: &ValidationContext) -> Verdict {
        each_invocation(segment, self.commands(), "mysqladmin", |argv| {
            match argv[1..]
                .iter()
                .find(|arg| matches!(arg.to_lowercase().as_str(), "drop" | "shutdown" | "kill"))
            {
                Some(op) => Verdict::block(format!(
                    "mysqladmin '{}' is blocked for safety. Destructive operations require manual confirmation.",
                    op
                )),
                None => Verdict::Allow,
            }
        })
    }
}
