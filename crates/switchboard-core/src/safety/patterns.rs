//! Injection-indicator catalog.
//!
//! One static table of `(category, regex)` entries. The table is the policy;
//! [`PatternCatalog::load`] drops repeated regexes and compiles the rest into
//! a single [`RegexSet`] so a query is scanned once regardless of table size.

use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::RegexSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InjectionPattern {
    pub category: &'static str,
    pub regex: &'static str,
}

const fn p(category: &'static str, regex: &'static str) -> InjectionPattern {
    InjectionPattern { category, regex }
}

pub static INJECTION_PATTERNS: &[InjectionPattern] = &[
    // Union-based exfiltration
    p("union select", r"\bunion(\s+all|\s+distinct)?\s+select\b"),
    // System catalogs
    p("system catalog access", r"\binformation_schema\b"),
    p("system catalog access", r"\bpg_catalog\b"),
    p("system catalog access", r"\bpg_(shadow|authid|user|roles)\b"),
    p("system catalog access", r"\bsqlite_(master|schema|temp_master)\b"),
    p("system catalog access", r"\bmysql\.(user|db)\b"),
    p("system catalog access", r"\b(sysobjects|syscolumns|sysusers|msysobjects)\b"),
    p("system catalog access", r"\bsys\.(objects|tables|columns|databases|sql_logins)\b"),
    p("system catalog access", r"\b(all_tables|all_users|dba_users|dba_tables|user_tables)\b"),
    // Time-based and side-channel probes
    p("time-based function", r"\bsleep\s*\("),
    p("time-based function", r"\bpg_sleep(_for|_until)?\s*\("),
    p("time-based function", r"\bbenchmark\s*\("),
    p("time-based function", r"\bwaitfor\s+(delay|time)\b"),
    p("time-based function", r"\bdbms_lock\.sleep\b"),
    p("time-based function", r"\bdbms_pipe\.receive_message\b"),
    // File access
    p("file I/O function", r"\bload_file\s*\("),
    p("file I/O function", r"\binto\s+(outfile|dumpfile)\b"),
    p("file I/O function", r"\bpg_(read_file|read_binary_file|ls_dir|stat_file)\s*\("),
    p("file I/O function", r"\blo_(import|export)\s*\("),
    p("file I/O function", r"\butl_file\."),
    p("file I/O function", r"\b(openrowset|opendatasource|openquery)\s*\("),
    p("file I/O function", r"\bcopy\s+\w+\s+(from|to)\s+(program|stdin|stdout|')"),
    // Dynamic SQL
    p("dynamic execution", r"\bsp_executesql\b"),
    p("dynamic execution", r"\bexecute\s+immediate\b"),
    p("dynamic execution", r"\bdbms_sql\."),
    p("dynamic execution", r"\bprepare\s+\w+\s+from\b"),
    // Vendor-specific privileged procedures
    p("privileged procedure", r"\bxp_(cmdshell|regread|regwrite|dirtree|fileexist)\b"),
    p("privileged procedure", r"\bsp_(oacreate|oamethod|configure|addlogin|addsrvrolemember)\b"),
    p("privileged procedure", r"\bdbms_xmlgen\.\w+"),
    p("privileged procedure", r"\bdbms_java\."),
    p("privileged procedure", r"\butl_(http|inaddr|smtp|tcp)\."),
];

pub struct PatternCatalog {
    set: RegexSet,
    entries: Vec<InjectionPattern>,
}

impl PatternCatalog {
    /// Compile `defs`, keeping the first occurrence of each regex.
    pub fn load(defs: &[InjectionPattern]) -> Result<Self, regex::Error> {
        let mut seen = HashSet::new();
        let entries: Vec<InjectionPattern> = defs
            .iter()
            .filter(|d| seen.insert(d.regex))
            .copied()
            .collect();
        let set = RegexSet::new(entries.iter().map(|d| format!("(?i){}", d.regex)))?;
        Ok(Self { set, entries })
    }

    /// The first table entry that matches `text`.
    pub fn first_match(&self, text: &str) -> Option<&InjectionPattern> {
        self.set
            .matches(text)
            .into_iter()
            .next()
            .map(|i| &self.entries[i])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

lazy_static! {
    pub static ref CATALOG: PatternCatalog =
        PatternCatalog::load(INJECTION_PATTERNS).expect("built-in injection patterns compile");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table_has_no_duplicates() {
        assert_eq!(CATALOG.len(), INJECTION_PATTERNS.len());
    }

    #[test]
    fn test_load_drops_repeated_regexes() {
        let defs = [
            p("a", r"\bdbms_xmlgen\.\w+"),
            p("b", r"\bdbms_xmlgen\.\w+"),
            p("c", r"\bfoo\b"),
        ];
        let catalog = PatternCatalog::load(&defs).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.first_match("select dbms_xmlgen.getxml('x')").unwrap().category, "a");
    }

    #[test]
    fn test_categories_match() {
        let cases = [
            ("select 1 union all select password from users", "union select"),
            ("select * from information_schema.tables", "system catalog access"),
            ("select name from sqlite_master", "system catalog access"),
            ("select pg_sleep(5)", "time-based function"),
            ("select 1 waitfor delay '0:0:5'", "time-based function"),
            ("select load_file('/etc/passwd')", "file I/O function"),
            ("select * from t into outfile '/tmp/x'", "file I/O function"),
            ("select dbms_xmlgen.getxmltype('q') from dual", "privileged procedure"),
            ("select utl_http.request('http://x') from dual", "privileged procedure"),
        ];
        for (query, category) in cases {
            let hit = CATALOG.first_match(query);
            assert_eq!(hit.map(|h| h.category), Some(category), "query: {}", query);
        }
    }

    #[test]
    fn test_ordinary_queries_pass() {
        for query in [
            "select id, name from users where created_at > '2024-01-01'",
            "with recent as (select * from orders) select count(*) from recent",
            "select sleep_hours from patients",
        ] {
            assert!(CATALOG.first_match(query).is_none(), "query: {}", query);
        }
    }
}
