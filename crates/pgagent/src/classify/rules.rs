//! Ordered classification rule table.
//!
//! Each rule pairs a message shape with the classification it yields and an
//! optional handler that extracts details, related pids and secret markers.
//! Rules are tried in table order against the primary line's body and the
//! first match wins, so specific shapes must sit ahead of general ones that
//! would also match them.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use super::autovacuum;
use super::classification::LogClassification;
use super::classification::LogClassification as C;
use super::markers::{body, mark_groups, mark_quoted, mark_rest, mark_trimmed};
use crate::parser::formats::unwrap_continuations;
use crate::parser::model::{LogLevel, LogLine, QuerySample, SecretKind};
use crate::sample;

/// A primary line together with the subsidiary lines that elaborate on it.
pub struct Group<'a> {
    /// Body of the primary line, matched against the rule table
    pub text: &'a str,
    pub primary: &'a mut LogLine,
    pub subsidiaries: &'a mut [LogLine],
    pub samples: &'a mut Vec<QuerySample>,
}

impl<'a> Group<'a> {
    pub fn find(&mut self, level: LogLevel) -> Option<&mut LogLine> {
        self.subsidiaries.iter_mut().find(|l| l.log_level == level)
    }

    pub fn detail(&mut self) -> Option<&mut LogLine> {
        self.find(LogLevel::Detail)
    }

    pub fn context(&mut self) -> Option<&mut LogLine> {
        self.find(LogLevel::Context)
    }

    /// Body of the first DETAIL line, if any.
    pub fn detail_text(&self) -> Option<String> {
        self.subsidiaries
            .iter()
            .find(|l| l.log_level == LogLevel::Detail)
            .map(|l| body(&l.content).to_string())
    }
}

/// Handler run after a rule matched and its classification was assigned.
pub type Apply = fn(&mut Group<'_>, &Captures<'_>);

enum Shape {
    /// Any of these literal prefixes
    Prefix(&'static [&'static str]),
    /// An anchored regular expression
    Pattern(&'static str),
}

pub struct Rule {
    shape: Shape,
    pub classification: LogClassification,
    apply: Option<Apply>,
}

impl Rule {
    fn source(&self) -> String {
        match self.shape {
            Shape::Prefix(prefixes) => {
                let alternatives: Vec<String> = prefixes.iter().map(|p| regex::escape(p)).collect();
                format!("^(?:{})", alternatives.join("|"))
            }
            Shape::Pattern(pattern) => pattern.to_string(),
        }
    }
}

const fn prefix(prefixes: &'static [&'static str], classification: LogClassification) -> Rule {
    Rule { shape: Shape::Prefix(prefixes), classification, apply: None }
}

const fn prefix_with(prefixes: &'static [&'static str], classification: LogClassification, apply: Apply) -> Rule {
    Rule { shape: Shape::Prefix(prefixes), classification, apply: Some(apply) }
}

const fn pattern(pattern: &'static str, classification: LogClassification) -> Rule {
    Rule { shape: Shape::Pattern(pattern), classification, apply: None }
}

const fn pattern_with(pattern: &'static str, classification: LogClassification, apply: Apply) -> Rule {
    Rule { shape: Shape::Pattern(pattern), classification, apply: Some(apply) }
}

static RULES: &[Rule] = &[
    // Connections
    prefix_with(&["connection received: "], C::ConnectionReceived, connection_received),
    prefix_with(&["connection authorized: "], C::ConnectionAuthorized, connection_authorized),
    prefix_with(
        &[
            "pg_hba.conf rejects connection ",
            "password authentication failed for user",
            "no pg_hba.conf entry for",
            "Ident authentication failed for user",
            "could not connect to Ident server",
        ],
        C::ConnectionRejected,
        connection_rejected,
    ),
    pattern_with(r#"^database ".+?" is not currently accepting connections"#, C::ConnectionRejected, connection_rejected),
    pattern_with(r#"^role ".+?" is not permitted to log in"#, C::ConnectionRejected, connection_rejected),
    pattern_with(
        r"^disconnection: (?:session time: (\d+):(\d+):([\d\.]+))?",
        C::ConnectionDisconnected,
        disconnection,
    ),
    prefix(&["incomplete startup packet"], C::ConnectionClientFailedToConnect),
    prefix(
        &[
            "could not receive data from client",
            "could not send data to client",
            "connection to client lost",
            "terminating connection because protocol synchronization was lost",
        ],
        C::ConnectionLost,
    ),
    prefix(&["unexpected EOF on client connection with an open transaction"], C::ConnectionLostOpenTx),
    prefix(&["unexpected EOF on client connection"], C::ConnectionLost),
    prefix(&["terminating connection due to administrator command"], C::ConnectionTerminated),
    prefix(&["remaining connection slots are reserved", "sorry, too many clients already"], C::OutOfConnections),
    prefix(&["too many connections for role"], C::TooManyConnectionsRole),
    prefix(&["too many connections for database"], C::TooManyConnectionsDatabase),
    prefix(&["could not accept SSL connection: "], C::CouldNotAcceptSslConnection),
    prefix(&["unsupported frontend protocol"], C::ProtocolErrorUnsupportedVersion),
    prefix(&["incomplete message from client"], C::ProtocolErrorIncompleteMessage),
    // Checkpointer
    pattern_with(r"^(checkpoint|restartpoint) starting: (.+)", C::CheckpointStarting, checkpoint_starting),
    pattern_with(
        r"^(checkpoint|restartpoint) complete: wrote (\d+) buffers \(([\d\.]+)%\); (\d+) (?:transaction log|WAL) file\(s\) added, (\d+) removed, (\d+) recycled; write=([\d\.]+) s, sync=([\d\.]+) s, total=([\d\.]+) s; sync files=(\d+), longest=([\d\.]+) s, average=([\d\.]+) s(?:; distance=(\d+) kB, estimate=(\d+) kB)?",
        C::CheckpointComplete,
        checkpoint_complete,
    ),
    pattern_with(
        r"^checkpoints are occurring too frequently \((\d+) seconds? apart\)",
        C::CheckpointTooFrequent,
        checkpoints_too_frequent,
    ),
    prefix(&["recovery restart point at"], C::RestartpointAt),
    // WAL and archiving
    prefix(&["invalid record length"], C::WalInvalidRecordLength),
    prefix(&["redo "], C::WalRedo),
    pattern_with(r"^last completed transaction was at log time (.+)", C::WalRedo, last_transaction),
    pattern_with(
        r"^archive command (?:failed with exit code (\d+)|was terminated by signal (\d+))",
        C::WalArchiveCommandFailed,
        archive_command_failed,
    ),
    prefix(&["archiver process"], C::WalArchiveCommandFailed),
    prefix(
        &["pg_stop_backup complete, all required WAL segments have been archived"],
        C::WalBaseBackupComplete,
    ),
    // Locks
    pattern_with(
        r"^process \d+ acquired (\w+Lock) on (\w+)(?: [\(\)\d,]+)?( of \w+ \d+)* after ([\d\.]+) ms",
        C::LockAcquired,
        lock_acquired,
    ),
    pattern_with(
        r"^process \d+ (still waiting|avoided deadlock|detected deadlock while waiting) for (\w+) on (\w+) (?:.+?) after ([\d\.]+) ms",
        C::LockWaiting,
        lock_wait,
    ),
    prefix_with(&["deadlock detected"], C::LockDeadlockDetected, deadlock_detected),
    prefix(&["canceling statement due to lock timeout"], C::LockTimeout),
    // Statement duration and auto_explain, the latter first since it is a
    // subset of the former
    pattern_with(r"^duration: ([\d\.]+) ms\s+ plan:([\s\S]+)", C::StatementAutoExplain, sample::explain::auto_explain),
    pattern_with(r"^duration: ([\d\.]+) ms", C::StatementDuration, sample::duration),
    // Statement log
    pattern_with(r"^statement: (.*)", C::StatementLog, statement_log),
    pattern_with(r"^execute (.+?): (.*)", C::StatementLog, execute_log),
    // Statement cancellation
    prefix(&["canceling statement due to statement timeout"], C::StatementCanceledTimeout),
    prefix(&["canceling statement due to user request"], C::StatementCanceledUser),
    // Autovacuum
    prefix_with(&["canceling autovacuum task"], C::AutovacuumCancel, autovacuum_cancel),
    pattern_with(
        r#"^database (with OID (\d+)|"(.+?)") must be vacuumed within (\d+) transactions"#,
        C::TxidWraparoundWarning,
        wraparound_warning,
    ),
    pattern_with(
        r#"^database is not accepting commands to avoid wraparound data loss in database (with OID (\d+)|"(.+?)")"#,
        C::TxidWraparoundError,
        wraparound_error,
    ),
    prefix(&["autovacuum launcher started"], C::AutovacuumLauncherStarted),
    prefix(
        &[
            "autovacuum launcher shutting down",
            "terminating autovacuum process due to administrator command",
        ],
        C::AutovacuumLauncherShuttingDown,
    ),
    pattern_with(
        r#"^automatic (?:aggressive )?vacuum (?:to prevent wraparound )?of table ".+?":"#,
        C::AutovacuumCompleted,
        autovacuum_completed,
    ),
    pattern_with(r#"^automatic analyze of table ".+?""#, C::AutoanalyzeCompleted, autoanalyze_completed),
    pattern_with(
        r#"^skipping vacuum of "(.+?)" --- lock not available"#,
        C::SkippingVacuumLockNotAvailable,
        skipped_relation,
    ),
    pattern_with(
        r#"^skipping analyze of "(.+?)" --- lock not available"#,
        C::SkippingAnalyzeLockNotAvailable,
        skipped_relation,
    ),
    // Server events
    pattern_with(
        r"^server process \(PID (\d+)\) was terminated by signal (6|11)",
        C::ServerCrashed,
        server_process_terminated,
    ),
    pattern_with(
        r"^server process \(PID (\d+)\) was terminated by signal (9)",
        C::ServerOutOfMemory,
        server_process_terminated,
    ),
    prefix(
        &[
            "terminating any other active server processes",
            "terminating connection because of crash of another server process",
            "all server processes terminated; reinitializing",
        ],
        C::ServerCrashed,
    ),
    prefix(
        &[
            "database system was shut down",
            "database system is ready",
            "MultiXact member wraparound protections are now enabled",
            "entering standby mode",
            "redirecting log output to logging collector process",
            "ending log output to stderr",
        ],
        C::ServerStart,
    ),
    prefix(
        &[
            "database system was interrupted",
            "database system was not properly shut down",
            "database system shutdown was interrupted",
        ],
        C::ServerStartRecovering,
    ),
    pattern(r"^received \w+ shutdown request", C::ServerShutdown),
    prefix(
        &[
            "aborting any active transactions",
            "shutting down",
            "the database system is shutting down",
            "database system is shut down",
        ],
        C::ServerShutdown,
    ),
    prefix(&["out of memory"], C::ServerOutOfMemory),
    prefix(&["page verification failed"], C::ServerInvalidChecksum),
    pattern_with(r"^invalid page in block (\d+) of relation (.+)", C::ServerInvalidChecksum, invalid_page),
    pattern_with(r#"^temporary file: path "(.+?)", size (\d+)"#, C::ServerTempFileCreated, temporary_file),
    pattern_with(r#"^could not open usermap file "(.+?)": (.+)"#, C::ServerMisc, mark_ops_groups),
    pattern_with(r#"^could not link file "(.+?)" to "(.+?)": (.+)"#, C::ServerMisc, mark_ops_groups),
    prefix(&["could not open usermap file", "could not link file", "unexpected pageaddr"], C::ServerMisc),
    prefix(&["received SIGHUP, reloading configuration files"], C::ServerReload),
    pattern(r#"^parameter ".+?" (changed|cannot be changed)"#, C::ServerReload),
    pattern(r#"^configuration file ".+?" contains errors"#, C::ServerReload),
    pattern_with(
        r"^worker process: (.+?) \(PID (\d+)\) (?:exited with exit code (\d+)|was terminated by signal (\d+))",
        C::ServerProcessExited,
        worker_process_exited,
    ),
    prefix(
        &[
            "using stale statistics instead of current ones because stats collector is not responding",
            "pgstat wait timeout",
        ],
        C::ServerStatsCollectorTimeout,
    ),
    // Standby
    prefix(&["restored log file"], C::StandbyRestoredWalFromArchive),
    prefix(&["started streaming WAL", "restarted WAL streaming"], C::StandbyStartedStreaming),
    pattern_with(r"^could not receive data from WAL stream: (.+)", C::StandbyStreamingInterrupted, mark_ops_groups),
    prefix(&["could not receive data from WAL stream"], C::StandbyStreamingInterrupted),
    prefix(&["terminating walreceiver process"], C::StandbyStoppedStreaming),
    prefix(&["consistent recovery state reached at"], C::StandbyConsistentRecoveryState),
    prefix(&["canceling statement due to conflict with recovery"], C::StandbyStatementCanceled),
    pattern(
        r"^according to history file, WAL location .+? belongs to timeline \d+, but previous recovered WAL file came from timeline \d+",
        C::StandbyInvalidTimeline,
    ),
    // Constraint violations
    pattern_with(
        r#"^duplicate key value violates unique constraint "(.+?)""#,
        C::UniqueConstraintViolation,
        constraint_violation,
    ),
    pattern_with(
        r#"^insert or update on table "(.+?)" violates foreign key constraint "(.+?)""#,
        C::ForeignKeyConstraintViolation,
        constraint_violation,
    ),
    pattern_with(
        r#"^update or delete on table "(.+?)" violates foreign key constraint "(.+?)" on table "(.+?)""#,
        C::ForeignKeyConstraintViolation,
        constraint_violation,
    ),
    pattern_with(
        r#"^null value in column "(.+?)" violates not-null constraint"#,
        C::NotNullConstraintViolation,
        constraint_violation,
    ),
    pattern_with(
        r#"^new row for relation "(.+?)" violates check constraint "(.+?)""#,
        C::CheckConstraintViolation,
        constraint_violation,
    ),
    pattern_with(
        r#"^check constraint "(.+?)" is violated by some row"#,
        C::CheckConstraintViolation,
        constraint_violation,
    ),
    pattern_with(
        r#"^column "(.+?)" of table "(.+?)" contains values that violate the new constraint"#,
        C::CheckConstraintViolation,
        constraint_violation,
    ),
    pattern_with(
        r#"^value for domain (.+?) violates check constraint "(.+?)""#,
        C::CheckConstraintViolation,
        constraint_violation,
    ),
    pattern_with(
        r#"^conflicting key value violates exclusion constraint "(.+?)""#,
        C::ExclusionConstraintViolation,
        constraint_violation,
    ),
    // Application errors
    prefix_with(&["syntax error"], C::SyntaxError, mark_near_token),
    prefix_with(&["invalid input syntax for"], C::InvalidInputSyntax, invalid_input_syntax),
    prefix(&["value too long for type"], C::ValueTooLongForType),
    prefix_with(&["invalid value"], C::InvalidValue, invalid_value),
    prefix_with(&["malformed array literal"], C::MalformedArrayLiteral, malformed_array_literal),
    prefix(&["subquery in FROM must have an alias"], C::SubqueryMissingAlias),
    prefix(&["INSERT has more expressions than target columns"], C::InsertTargetColumnMismatch),
    prefix(&["op ANY/ALL (array) requires array on right side"], C::AnyAllRequiresArray),
    pattern(
        r#"^column "(.+?)" must appear in the GROUP BY clause or be used in an aggregate function"#,
        C::ColumnMissingFromGroupBy,
    ),
    pattern(r#"^column "(.+?)" does not exist"#, C::ColumnDoesNotExist),
    pattern(r#"^column "(.+?)" on "(.+?)" does not exist"#, C::ColumnDoesNotExist),
    pattern(r#"^column reference "(.+?)" is ambiguous"#, C::ColumnReferenceAmbiguous),
    pattern(r#"^relation "(.+?)" does not exist"#, C::RelationDoesNotExist),
    pattern(r"^function (.+?) does not exist", C::FunctionDoesNotExist),
    prefix(&["operator does not exist"], C::OperatorDoesNotExist),
    prefix(&["permission denied"], C::PermissionDenied),
    prefix(
        &["current transaction is aborted, commands ignored until end of transaction block"],
        C::TransactionIsAborted,
    ),
    prefix(
        &["there is no unique or exclusion constraint matching the ON CONFLICT specification"],
        C::OnConflictNoConstraintMatch,
    ),
    prefix(
        &["ON CONFLICT DO UPDATE command cannot affect row a second time"],
        C::OnConflictRowAffectedTwice,
    ),
    pattern(r#"^column "(.+?)" cannot be cast to type "(.+?)""#, C::ColumnCannotBeCast),
    prefix(&["division by zero"], C::DivisionByZero),
    pattern(r"^cannot drop (.+?) because other objects depend on it", C::CannotDrop),
    prefix(&["integer out of range"], C::IntegerOutOfRange),
    prefix(&["invalid regular expression: "], C::InvalidRegexp),
    prefix(&["there is no parameter $"], C::ParamMissing),
    prefix(&["no such savepoint"], C::NoSuchSavepoint),
    prefix_with(&["unterminated quoted string at or near"], C::UnterminatedQuotedString, mark_near_token),
    prefix_with(&["unterminated quoted identifier at or near"], C::UnterminatedQuotedIdentifier, mark_near_token),
    pattern_with(r#"^invalid byte sequence for encoding ".+?": (.+)"#, C::InvalidByteSequence, mark_table_data_group),
    prefix(&["invalid byte sequence for encoding"], C::InvalidByteSequence),
    prefix(&["could not serialize access due to concurrent update"], C::CouldNotSerializeRepeatableRead),
    prefix(&["could not serialize access due to read/write dependencies"], C::CouldNotSerializeSerializable),
    prefix(
        &["range lower bound must be less than or equal to range upper bound"],
        C::InconsistentRangeBounds,
    ),
    // Collector self-test
    pattern_with(r"^pganalyze-collector-identify: (.*)", C::PgaCollectorIdentify, collector_identify),
];

static COMPILED: Lazy<Vec<Regex>> = Lazy::new(|| {
    RULES
        .iter()
        .map(|rule| Regex::new(&rule.source()).expect("valid rule regex"))
        .collect()
});

/// Classifies the group's primary line with the first matching rule.
///
/// Returns `false` and leaves the group untouched when nothing matches.
pub fn classify(group: &mut Group<'_>) -> bool {
    let text = group.text;
    let Some((rule, caps)) = RULES
        .iter()
        .zip(COMPILED.iter())
        .find_map(|(rule, re)| re.captures(text).map(|caps| (rule, caps)))
    else {
        return false;
    };

    group.primary.classification = rule.classification;
    if let Some(apply) = rule.apply {
        apply(group, &caps);
    }
    true
}

pub fn rule_count() -> usize {
    RULES.len()
}

// ── Capture helpers ─────────────────────────────────────────────

pub(crate) fn int(caps: &Captures<'_>, idx: usize) -> Option<i64> {
    caps.get(idx).and_then(|m| m.as_str().parse().ok())
}

pub(crate) fn float(caps: &Captures<'_>, idx: usize) -> Option<f64> {
    caps.get(idx).and_then(|m| m.as_str().parse().ok())
}

fn set_int(line: &mut LogLine, key: &str, caps: &Captures<'_>, idx: usize) {
    if let Some(v) = int(caps, idx) {
        line.set_detail(key, v);
    }
}

fn set_float(line: &mut LogLine, key: &str, caps: &Captures<'_>, idx: usize) {
    if let Some(v) = float(caps, idx) {
        line.set_detail(key, v);
    }
}

/// Parses a `583, 123` pid list, tolerating a trailing period.
fn pid_list(text: &str) -> Vec<i64> {
    text.split(',')
        .filter_map(|s| s.trim().trim_end_matches('.').parse().ok())
        .collect()
}

// ── Connections ─────────────────────────────────────────────────

static RECEIVED_HOST: Lazy<Regex> = Lazy::new(|| Regex::new(r"host=(\S+)").expect("valid host regex"));
static SSL_PROTOCOL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"SSL enabled \(protocol=([^,\)]+)").expect("valid ssl regex"));
static HBA_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"Connection matched pg_hba\.conf line \d+: "(.*)""#).expect("valid hba regex"));

fn connection_received(g: &mut Group<'_>, _: &Captures<'_>) {
    if let Some(caps) = RECEIVED_HOST.captures(g.text) {
        g.primary.set_detail("host", &caps[1]);
    }
}

fn connection_authorized(g: &mut Group<'_>, _: &Captures<'_>) {
    if let Some(caps) = SSL_PROTOCOL.captures(g.text) {
        g.primary.set_detail("ssl_protocol", &caps[1]);
    }
}

fn connection_rejected(g: &mut Group<'_>, _: &Captures<'_>) {
    if let Some(detail) = g.detail() {
        mark_groups(detail, &HBA_LINE, SecretKind::Ops);
    }
}

fn disconnection(g: &mut Group<'_>, caps: &Captures<'_>) {
    if let (Some(h), Some(m), Some(s)) = (float(caps, 1), float(caps, 2), float(caps, 3)) {
        g.primary.set_detail("session_time_secs", h * 3600.0 + m * 60.0 + s);
    }
}

// ── Checkpoints and WAL ─────────────────────────────────────────

fn checkpoint_starting(g: &mut Group<'_>, caps: &Captures<'_>) {
    if &caps[1] == "restartpoint" {
        g.primary.classification = C::RestartpointStarting;
    }
    g.primary.set_detail("reason", &caps[2]);
}

fn checkpoint_complete(g: &mut Group<'_>, caps: &Captures<'_>) {
    let line = &mut *g.primary;
    if &caps[1] == "restartpoint" {
        line.classification = C::RestartpointComplete;
    }
    set_int(line, "bufs_written", caps, 2);
    set_float(line, "bufs_written_pct", caps, 3);
    set_int(line, "segs_added", caps, 4);
    set_int(line, "segs_removed", caps, 5);
    set_int(line, "segs_recycled", caps, 6);
    set_float(line, "write_secs", caps, 7);
    set_float(line, "sync_secs", caps, 8);
    set_float(line, "total_secs", caps, 9);
    set_int(line, "sync_rels", caps, 10);
    set_float(line, "longest_secs", caps, 11);
    set_float(line, "average_secs", caps, 12);
    // 9.5+
    set_int(line, "distance_kb", caps, 13);
    set_int(line, "estimate_kb", caps, 14);
}

fn checkpoints_too_frequent(g: &mut Group<'_>, caps: &Captures<'_>) {
    set_int(g.primary, "elapsed_secs", caps, 1);
}

fn last_transaction(g: &mut Group<'_>, caps: &Captures<'_>) {
    g.primary.set_detail("last_transaction", &caps[1]);
}

fn archive_command_failed(g: &mut Group<'_>, caps: &Captures<'_>) {
    set_int(g.primary, "exit_code", caps, 1);
    set_int(g.primary, "signal", caps, 2);
    if let Some(detail) = g.detail() {
        const LEAD: &str = "The failed archive command was: ";
        if detail.content.starts_with(LEAD) {
            mark_rest(detail, LEAD.len(), SecretKind::Ops);
        }
    }
}

// ── Locks ───────────────────────────────────────────────────────

static LOCK_QUEUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^Process(?:es)? holding the lock: ([\d, ]+). Wait queue: ([\d, ]+)").expect("valid lock queue regex")
});
static DEADLOCK_PROCESS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^Process (\d+)").expect("valid deadlock regex"));
static DEADLOCK_QUERY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^Process \d+: (.+)$").expect("valid deadlock query regex"));

fn lock_acquired(g: &mut Group<'_>, caps: &Captures<'_>) {
    g.primary.set_detail("lock_mode", &caps[1]);
    g.primary.set_detail("lock_type", &caps[2]);
    set_float(g.primary, "after_ms", caps, 4);
}

fn lock_wait(g: &mut Group<'_>, caps: &Captures<'_>) {
    g.primary.classification = match &caps[1] {
        "avoided deadlock" => C::LockDeadlockAvoided,
        "detected deadlock while waiting" => C::LockDeadlockDetected,
        _ => C::LockWaiting,
    };
    // Names as they appear in pg_locks.locktype
    let lock_type = match &caps[3] {
        "extension" => "extend",
        "transaction" => "transactionid",
        "virtual" => "virtualxid",
        other => other,
    };
    g.primary.set_detail("lock_mode", &caps[2]);
    g.primary.set_detail("lock_type", lock_type);
    set_float(g.primary, "after_ms", caps, 4);

    let Some(detail) = g.detail_text() else {
        return;
    };
    if let Some(queue) = LOCK_QUEUE.captures(&detail) {
        let holders = pid_list(&queue[1]);
        let waiters = pid_list(&queue[2]);
        g.primary.related_pids = holders.iter().chain(waiters.iter()).map(|&p| p as i32).collect();
        g.primary.set_detail("lock_holders", holders);
        g.primary.set_detail("lock_waiters", waiters);
    }
}

fn deadlock_detected(g: &mut Group<'_>, _: &Captures<'_>) {
    let Some(detail) = g.detail() else {
        return;
    };
    let pids: Vec<i32> = DEADLOCK_PROCESS
        .captures_iter(body(&detail.content))
        .filter_map(|c| c[1].parse().ok())
        .collect();
    mark_groups(detail, &DEADLOCK_QUERY, SecretKind::StatementText);
    g.primary.related_pids = pids;
}

// ── Statement log ───────────────────────────────────────────────

fn statement_log(g: &mut Group<'_>, caps: &Captures<'_>) {
    if let Some(m) = caps.get(1) {
        logged_statement(g, m.start());
    }
}

fn execute_log(g: &mut Group<'_>, caps: &Captures<'_>) {
    if let Some(m) = caps.get(2) {
        logged_statement(g, m.start());
    }
}

fn logged_statement(g: &mut Group<'_>, start: usize) {
    let query = g.text[start..].trim();
    if !query.is_empty() {
        g.primary.query = Some(unwrap_continuations(query).into_owned());
    }
    mark_rest(g.primary, start, SecretKind::StatementText);
}

// ── Autovacuum ──────────────────────────────────────────────────

static AUTOVACUUM_CONTEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"automatic (?:vacuum|analyze) of table "(.+?)""#).expect("valid autovacuum context regex")
});

fn autovacuum_cancel(g: &mut Group<'_>, _: &Captures<'_>) {
    let Some(context) = g.context().map(|c| body(&c.content).to_string()) else {
        return;
    };
    if let Some(caps) = AUTOVACUUM_CONTEXT.captures(&context) {
        autovacuum::set_relation(g.primary, &caps[1]);
    }
}

fn wraparound_warning(g: &mut Group<'_>, caps: &Captures<'_>) {
    set_int(g.primary, "remaining_xids", caps, 4);
    wraparound_database(g.primary, caps);
}

fn wraparound_error(g: &mut Group<'_>, caps: &Captures<'_>) {
    wraparound_database(g.primary, caps);
}

fn wraparound_database(line: &mut LogLine, caps: &Captures<'_>) {
    set_int(line, "database_oid", caps, 2);
    if let Some(name) = caps.get(3) {
        line.set_detail("database_name", name.as_str());
    }
}

fn autovacuum_completed(g: &mut Group<'_>, _: &Captures<'_>) {
    autovacuum::parse_vacuum(g.primary, g.text);
}

fn autoanalyze_completed(g: &mut Group<'_>, _: &Captures<'_>) {
    autovacuum::parse_analyze(g.primary, g.text);
}

fn skipped_relation(g: &mut Group<'_>, caps: &Captures<'_>) {
    g.primary.relation_name = caps[1].to_string();
}

// ── Server events ───────────────────────────────────────────────

static PARALLEL_WORKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^parallel worker for PID (\d+)").expect("valid parallel worker regex"));

fn server_process_terminated(g: &mut Group<'_>, caps: &Captures<'_>) {
    let pid = int(caps, 1);
    g.primary.set_detail("process_type", "server process");
    set_int(g.primary, "process_pid", caps, 1);
    set_int(g.primary, "signal", caps, 2);
    g.primary.related_pids = pid.map(|p| vec![p as i32]).unwrap_or_default();

    if let Some(detail) = g.detail() {
        const LEAD: &str = "Failed process was running: ";
        if detail.content.starts_with(LEAD) {
            mark_rest(detail, LEAD.len(), SecretKind::StatementText);
        }
    }
}

fn invalid_page(g: &mut Group<'_>, caps: &Captures<'_>) {
    set_int(g.primary, "block", caps, 1);
    g.primary.set_detail("file", &caps[2]);
}

fn temporary_file(g: &mut Group<'_>, caps: &Captures<'_>) {
    g.primary.set_detail("file", &caps[1]);
    set_int(g.primary, "size", caps, 2);
}

fn worker_process_exited(g: &mut Group<'_>, caps: &Captures<'_>) {
    let line = &mut *g.primary;
    let mut related: Vec<i32> = int(caps, 2).map(|p| vec![p as i32]).unwrap_or_default();
    line.set_detail("process_type", &caps[1]);
    set_int(line, "process_pid", caps, 2);
    set_int(line, "exit_code", caps, 3);
    set_int(line, "signal", caps, 4);

    if let Some(parent) = PARALLEL_WORKER.captures(&caps[1]) {
        if let Some(parent_pid) = int(&parent, 1) {
            line.set_detail("process_type", "parallel worker");
            line.set_detail("parent_pid", parent_pid);
            related.push(parent_pid as i32);
        }
    }
    line.related_pids = related;
}

/// Marks every capture group of the primary match as operational detail.
fn mark_ops_groups(g: &mut Group<'_>, caps: &Captures<'_>) {
    for m in caps.iter().skip(1).flatten() {
        mark_trimmed(g.primary, m.start(), m.end(), SecretKind::Ops);
    }
}

// ── Constraint violations ───────────────────────────────────────

static KEY_VALUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i:key) \(.+?\)=\((.+?)\)(?: already exists| is not present| is still referenced| conflicts with existing|\.$)",
    )
    .expect("valid key value regex")
});
static FAILING_ROW: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Failing row contains \((.*)\)").expect("valid failing row regex"));

fn constraint_violation(g: &mut Group<'_>, _: &Captures<'_>) {
    if let Some(detail) = g.detail() {
        mark_groups(detail, &KEY_VALUE, SecretKind::TableData);
        mark_groups(detail, &FAILING_ROW, SecretKind::TableData);
    }
}

// ── Application errors ──────────────────────────────────────────

static NEAR_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r#"at or near "(.*)""#).expect("valid near token regex"));
static INPUT_SYNTAX_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^invalid input syntax for [^:]+: "(.*)""#).expect("valid input syntax regex"));
static ARRAY_LITERAL: Lazy<Regex> = Lazy::new(|| Regex::new(r#": "(.*)""#).expect("valid array literal regex"));

fn mark_near_token(g: &mut Group<'_>, _: &Captures<'_>) {
    mark_groups(g.primary, &NEAR_TOKEN, SecretKind::ParsingError);
}

fn invalid_input_syntax(g: &mut Group<'_>, _: &Captures<'_>) {
    mark_groups(g.primary, &INPUT_SYNTAX_VALUE, SecretKind::TableData);
    if let Some(detail) = g.detail() {
        mark_quoted(detail, SecretKind::TableData);
    }
}

fn invalid_value(g: &mut Group<'_>, _: &Captures<'_>) {
    mark_quoted(g.primary, SecretKind::TableData);
}

fn malformed_array_literal(g: &mut Group<'_>, _: &Captures<'_>) {
    mark_groups(g.primary, &ARRAY_LITERAL, SecretKind::TableData);
}

fn mark_table_data_group(g: &mut Group<'_>, caps: &Captures<'_>) {
    if let Some(m) = caps.get(1) {
        mark_trimmed(g.primary, m.start(), m.end(), SecretKind::TableData);
    }
}

fn collector_identify(g: &mut Group<'_>, caps: &Captures<'_>) {
    let Some(m) = caps.get(1) else {
        return;
    };
    g.primary.set_detail("config_section", m.as_str().trim());
    mark_trimmed(g.primary, m.start(), m.end(), SecretKind::Unidentified);
}
