use serde::{Deserialize, Serialize};

macro_rules! classifications {
    ($($variant:ident => $name:literal,)+) => {
        /// Semantic category assigned to a primary log line.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum LogClassification {
            #[default]
            Unknown,
            $($variant,)+
        }

        impl LogClassification {
            /// Every classification except `Unknown`, in declaration order.
            pub const ALL: &'static [LogClassification] = &[$(LogClassification::$variant,)+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    LogClassification::Unknown => "UNKNOWN",
                    $(LogClassification::$variant => $name,)+
                }
            }

            pub fn from_name(name: &str) -> Self {
                match name {
                    $($name => LogClassification::$variant,)+
                    _ => LogClassification::Unknown,
                }
            }
        }
    };
}

classifications! {
    // Connections
    ConnectionReceived => "CONNECTION_RECEIVED",
    ConnectionAuthorized => "CONNECTION_AUTHORIZED",
    ConnectionRejected => "CONNECTION_REJECTED",
    ConnectionDisconnected => "CONNECTION_DISCONNECTED",
    ConnectionClientFailedToConnect => "CONNECTION_CLIENT_FAILED_TO_CONNECT",
    ConnectionLost => "CONNECTION_LOST",
    ConnectionLostOpenTx => "CONNECTION_LOST_OPEN_TX",
    ConnectionTerminated => "CONNECTION_TERMINATED",
    OutOfConnections => "OUT_OF_CONNECTIONS",
    TooManyConnectionsRole => "TOO_MANY_CONNECTIONS_ROLE",
    TooManyConnectionsDatabase => "TOO_MANY_CONNECTIONS_DATABASE",
    CouldNotAcceptSslConnection => "COULD_NOT_ACCEPT_SSL_CONNECTION",
    ProtocolErrorUnsupportedVersion => "PROTOCOL_ERROR_UNSUPPORTED_VERSION",
    ProtocolErrorIncompleteMessage => "PROTOCOL_ERROR_INCOMPLETE_MESSAGE",

    // Checkpoints
    CheckpointStarting => "CHECKPOINT_STARTING",
    CheckpointComplete => "CHECKPOINT_COMPLETE",
    CheckpointTooFrequent => "CHECKPOINT_TOO_FREQUENT",
    RestartpointStarting => "RESTARTPOINT_STARTING",
    RestartpointComplete => "RESTARTPOINT_COMPLETE",
    RestartpointAt => "RESTARTPOINT_AT",

    // WAL / archiving
    WalInvalidRecordLength => "WAL_INVALID_RECORD_LENGTH",
    WalRedo => "WAL_REDO",
    WalArchiveCommandFailed => "WAL_ARCHIVE_COMMAND_FAILED",
    WalBaseBackupComplete => "WAL_BASE_BACKUP_COMPLETE",

    // Locks
    LockAcquired => "LOCK_ACQUIRED",
    LockWaiting => "LOCK_WAITING",
    LockDeadlockAvoided => "LOCK_DEADLOCK_AVOIDED",
    LockDeadlockDetected => "LOCK_DEADLOCK_DETECTED",
    LockTimeout => "LOCK_TIMEOUT",

    // Statements
    StatementDuration => "STATEMENT_DURATION",
    StatementAutoExplain => "STATEMENT_AUTO_EXPLAIN",
    StatementLog => "STATEMENT_LOG",
    StatementCanceledTimeout => "STATEMENT_CANCELED_TIMEOUT",
    StatementCanceledUser => "STATEMENT_CANCELED_USER",

    // Autovacuum
    AutovacuumCancel => "AUTOVACUUM_CANCEL",
    AutovacuumLauncherStarted => "AUTOVACUUM_LAUNCHER_STARTED",
    AutovacuumLauncherShuttingDown => "AUTOVACUUM_LAUNCHER_SHUTTING_DOWN",
    AutovacuumCompleted => "AUTOVACUUM_COMPLETED",
    AutoanalyzeCompleted => "AUTOANALYZE_COMPLETED",
    TxidWraparoundWarning => "TXID_WRAPAROUND_WARNING",
    TxidWraparoundError => "TXID_WRAPAROUND_ERROR",
    SkippingVacuumLockNotAvailable => "SKIPPING_VACUUM_LOCK_NOT_AVAILABLE",
    SkippingAnalyzeLockNotAvailable => "SKIPPING_ANALYZE_LOCK_NOT_AVAILABLE",

    // Server events
    ServerCrashed => "SERVER_CRASHED",
    ServerStart => "SERVER_START",
    ServerStartRecovering => "SERVER_START_RECOVERING",
    ServerShutdown => "SERVER_SHUTDOWN",
    ServerOutOfMemory => "SERVER_OUT_OF_MEMORY",
    ServerInvalidChecksum => "SERVER_INVALID_CHECKSUM",
    ServerTempFileCreated => "SERVER_TEMP_FILE_CREATED",
    ServerMisc => "SERVER_MISC",
    ServerReload => "SERVER_RELOAD",
    ServerProcessExited => "SERVER_PROCESS_EXITED",
    ServerStatsCollectorTimeout => "SERVER_STATS_COLLECTOR_TIMEOUT",

    // Standby
    StandbyRestoredWalFromArchive => "STANDBY_RESTORED_WAL_FROM_ARCHIVE",
    StandbyStartedStreaming => "STANDBY_STARTED_STREAMING",
    StandbyStreamingInterrupted => "STANDBY_STREAMING_INTERRUPTED",
    StandbyStoppedStreaming => "STANDBY_STOPPED_STREAMING",
    StandbyConsistentRecoveryState => "STANDBY_CONSISTENT_RECOVERY_STATE",
    StandbyStatementCanceled => "STANDBY_STATEMENT_CANCELED",
    StandbyInvalidTimeline => "STANDBY_INVALID_TIMELINE",

    // Constraint violations
    UniqueConstraintViolation => "UNIQUE_CONSTRAINT_VIOLATION",
    ForeignKeyConstraintViolation => "FOREIGN_KEY_CONSTRAINT_VIOLATION",
    NotNullConstraintViolation => "NOT_NULL_CONSTRAINT_VIOLATION",
    CheckConstraintViolation => "CHECK_CONSTRAINT_VIOLATION",
    ExclusionConstraintViolation => "EXCLUSION_CONSTRAINT_VIOLATION",

    // Application errors
    SyntaxError => "SYNTAX_ERROR",
    InvalidInputSyntax => "INVALID_INPUT_SYNTAX",
    ValueTooLongForType => "VALUE_TOO_LONG_FOR_TYPE",
    InvalidValue => "INVALID_VALUE",
    MalformedArrayLiteral => "MALFORMED_ARRAY_LITERAL",
    SubqueryMissingAlias => "SUBQUERY_MISSING_ALIAS",
    InsertTargetColumnMismatch => "INSERT_TARGET_COLUMN_MISMATCH",
    AnyAllRequiresArray => "ANY_ALL_REQUIRES_ARRAY",
    ColumnMissingFromGroupBy => "COLUMN_MISSING_FROM_GROUP_BY",
    ColumnDoesNotExist => "COLUMN_DOES_NOT_EXIST",
    ColumnReferenceAmbiguous => "COLUMN_REFERENCE_AMBIGUOUS",
    RelationDoesNotExist => "RELATION_DOES_NOT_EXIST",
    FunctionDoesNotExist => "FUNCTION_DOES_NOT_EXIST",
    OperatorDoesNotExist => "OPERATOR_DOES_NOT_EXIST",
    PermissionDenied => "PERMISSION_DENIED",
    TransactionIsAborted => "TRANSACTION_IS_ABORTED",
    OnConflictNoConstraintMatch => "ON_CONFLICT_NO_CONSTRAINT_MATCH",
    OnConflictRowAffectedTwice => "ON_CONFLICT_ROW_AFFECTED_TWICE",
    ColumnCannotBeCast => "COLUMN_CANNOT_BE_CAST",
    DivisionByZero => "DIVISION_BY_ZERO",
    CannotDrop => "CANNOT_DROP",
    IntegerOutOfRange => "INTEGER_OUT_OF_RANGE",
    InvalidRegexp => "INVALID_REGEXP",
    ParamMissing => "PARAM_MISSING",
    NoSuchSavepoint => "NO_SUCH_SAVEPOINT",
    UnterminatedQuotedString => "UNTERMINATED_QUOTED_STRING",
    UnterminatedQuotedIdentifier => "UNTERMINATED_QUOTED_IDENTIFIER",
    InvalidByteSequence => "INVALID_BYTE_SEQUENCE",
    CouldNotSerializeRepeatableRead => "COULD_NOT_SERIALIZE_REPEATABLE_READ",
    CouldNotSerializeSerializable => "COULD_NOT_SERIALIZE_SERIALIZABLE",
    InconsistentRangeBounds => "INCONSISTENT_RANGE_BOUNDS",

    // Collector self-test
    PgaCollectorIdentify => "PGA_COLLECTOR_IDENTIFY",
}

impl std::fmt::Display for LogClassification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
