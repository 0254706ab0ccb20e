use chrono_tz::Tz;

use crate::parser::model::{DetectionResult, LogLevel};
use crate::parser::prefix::CompiledPrefix;
use crate::parser::traits::{FormatDetector, LineParser, LogFormat, LogLine, ParseOutcome};

/// Parser for lines carrying a compiled `log_line_prefix`.
#[derive(Debug, Clone)]
pub struct PrefixParser {
    prefix: CompiledPrefix,
    tz: Option<Tz>,
}

impl PrefixParser {
    pub fn new(template: &str, tz: Option<Tz>) -> Self {
        Self {
            prefix: CompiledPrefix::compile(template),
            tz,
        }
    }

    pub fn template(&self) -> &str {
        self.prefix.template()
    }

    pub fn tz(&self) -> Option<Tz> {
        self.tz
    }
}

impl LineParser for PrefixParser {
    fn parse_line(&self, line: &str) -> ParseOutcome {
        let continuation = || ParseOutcome::Continuation(LogLine::with_content(line, LogLevel::Unknown));

        let Some(regex) = self.prefix.regex() else {
            return continuation();
        };
        let Some(caps) = regex.captures(line) else {
            return continuation();
        };

        let mut log_line = LogLine::default();
        for (idx, field) in self.prefix.fields().iter().enumerate() {
            let value = caps.get(idx + 1).map_or("", |m| m.as_str());
            field.apply(&mut log_line, value, self.tz);
        }

        // The level word and content are always the last two groups
        let groups = caps.len();
        let level = caps.get(groups - 2).map_or("", |m| m.as_str());
        log_line.content = caps.get(groups - 1).map_or("", |m| m.as_str()).to_string();
        log_line.log_level = LogLevel::from_name(level);

        ParseOutcome::Line(log_line)
    }

    fn format(&self) -> LogFormat {
        LogFormat::Prefix
    }
}

impl FormatDetector for PrefixParser {
    fn detect(&self, sample: &str) -> DetectionResult {
        match self.prefix.regex() {
            Some(re) if re.is_match(sample) => {
                DetectionResult::new(LogFormat::Prefix, Some(self.template().to_string()), 1.0)
            }
            _ => DetectionResult::no_match(),
        }
    }

    fn format(&self) -> LogFormat {
        LogFormat::Prefix
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::prefix::SUPPORTED_PREFIXES;
    use chrono::{DateTime, TimeZone, Utc};
    use test_case::test_case;

    fn template(name: &str) -> &'static str {
        SUPPORTED_PREFIXES.iter().find(|p| p.name == name).unwrap().template
    }

    fn parse(name: &str, line: &str) -> ParseOutcome {
        PrefixParser::new(template(name), None).parse_line(line)
    }

    fn ms(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32, milli: u32) -> Option<DateTime<Utc>> {
        Some(Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap() + chrono::Duration::milliseconds(milli as i64))
    }

    // ── Supported prefixes ──────────────────────────────────────

    #[test_case("amazon_rds", "2018-08-22 16:00:04 UTC:ec2-1-1-1-1.compute-1.amazonaws.com(48808):myuser@mydb:[18762]:LOG:  duration: 3668.685 ms  execute <unnamed>: SELECT 1", "myuser", "mydb", 18762, LogLevel::Log, "duration: 3668.685 ms  execute <unnamed>: SELECT 1" ; "amazon rds hostname")]
    #[test_case("amazon_rds", "2018-08-22 16:00:03 UTC:[local]:myuser@mydb:[21495]:LOG:  duration: 1630.946 ms  execute 3: SELECT 1", "myuser", "mydb", 21495, LogLevel::Log, "duration: 1630.946 ms  execute 3: SELECT 1" ; "amazon rds local")]
    #[test_case("azure", "2020-06-21 22:37:10 UTC-5eefe116.22f4-LOG:  could not receive data from client: An existing connection was forcibly closed by the remote host.", "", "", 0, LogLevel::Log, "could not receive data from client: An existing connection was forcibly closed by the remote host." ; "azure")]
    #[test_case("custom1", "2018-09-27 06:57:01.030 EST [20194][] : [1-1] [app=pganalyze_collector] LOG:  connection received: host=[local]", "", "", 20194, LogLevel::Log, "connection received: host=[local]" ; "custom1")]
    #[test_case("custom2", "2018-09-28 07:37:59 UTC [331-1] postgres@postgres LOG:  connection received: host=[local]", "postgres", "postgres", 331, LogLevel::Log, "connection received: host=[local]" ; "custom2")]
    #[test_case("custom3", "2018-09-27 06:57:02.779 UTC [20194] [user=postgres,db=postgres,app=psql] ERROR:  canceling statement due to user request", "postgres", "postgres", 20194, LogLevel::Error, "canceling statement due to user request" ; "custom3")]
    #[test_case("custom4", "2018-09-27 06:57:02.779 UTC [20194] [user=postgres,db=postgres,app=psql,host=127.0.0.1] ERROR:  canceling statement due to user request", "postgres", "postgres", 20194, LogLevel::Error, "canceling statement due to user request" ; "custom4")]
    #[test_case("custom5", "2018-09-28 07:39:48 UTC [347]: [3-1] user=postgres,db=postgres - PG-57014 ERROR:  canceling statement due to user request", "postgres", "postgres", 347, LogLevel::Error, "canceling statement due to user request" ; "custom5")]
    #[test_case("custom6", "2018-10-16 01:26:33 UTC [93911]: [3-1] user=postgres,db=postgres,app=psql,client=::1 ERROR:  canceling statement due to user request", "postgres", "postgres", 93911, LogLevel::Error, "canceling statement due to user request" ; "custom6")]
    #[test_case("custom7", "2019-01-01 02:00:28 UTC [34]: [3-1] [trx_id=120950] user=postgres,db=postgres ERROR:  canceling statement due to user request", "postgres", "postgres", 34, LogLevel::Error, "canceling statement due to user request" ; "custom7")]
    #[test_case("custom8", "[1127]: [8-1] db=postgres,user=pganalyze LOG:  duration: 2001.842 ms  statement: SELECT pg_sleep(2);", "pganalyze", "postgres", 1127, LogLevel::Log, "duration: 2001.842 ms  statement: SELECT pg_sleep(2);" ; "custom8")]
    #[test_case("custom9", "2020-05-21 17:53:05.307 UTC    [5ec6bfff.1] [1] LOG:  database system is ready to accept connections", "", "", 1, LogLevel::Log, "database system is ready to accept connections" ; "custom9 empty fields")]
    #[test_case("custom9", "2020-05-21 17:54:35.256 UTC 172.18.0.1(56402) pgaweb [unknown] [5ec6c05b.22] [34] LOG:  connection authorized: user=pgaweb database=pgaweb application_name=psql", "pgaweb", "", 34, LogLevel::Log, "connection authorized: user=pgaweb database=pgaweb application_name=psql" ; "custom9")]
    #[test_case("custom10", "2020-09-04 16:03:11.375 UTC [417880]: [1-1] db=mydb,user=myuser LOG:  pganalyze-collector-identify: myserver", "myuser", "mydb", 417880, LogLevel::Log, "pganalyze-collector-identify: myserver" ; "custom10")]
    #[test_case("custom11", "pid=8284,user=[unknown],db=[unknown],app=[unknown],client=[local] LOG: connection received: host=[local]", "", "", 8284, LogLevel::Log, "connection received: host=[local]" ; "custom11")]
    #[test_case("custom12", "user=[unknown],db=[unknown],app=[unknown],client=[local] LOG: connection received: host=[local]", "", "", 0, LogLevel::Log, "connection received: host=[local]" ; "custom12")]
    #[test_case("custom13", "51-2021-11-17 19:11:13 UTC-619553d1.33-2-172.20.0.1-pgaweb-pgaweb-2021-11-17 19:11:13.562 UTC LOG:  connection authorized: user=pgaweb database=pgaweb application_name=puma: cluster worker 2: 18544 [pganalyze]", "pgaweb", "pgaweb", 51, LogLevel::Log, "connection authorized: user=pgaweb database=pgaweb application_name=puma: cluster worker 2: 18544 [pganalyze]" ; "custom13")]
    #[test_case("custom14", "2021-11-17 19:06:53.897 UTC [34][autovacuum worker][3/5][22996] LOG:  automatic analyze of table \"mydb.pg_catalog.pg_class\" system usage: CPU: user: 0.00 s, system: 0.00 s, elapsed: 0.01 s", "", "", 34, LogLevel::Log, "automatic analyze of table \"mydb.pg_catalog.pg_class\" system usage: CPU: user: 0.00 s, system: 0.00 s, elapsed: 0.01 s" ; "custom14")]
    #[test_case("custom15", "2022-07-22 06:13:45.781 UTC [75] myuser@mydb LOG:  connection authorized: user=myuser database=mydb application_name=psql", "myuser", "mydb", 75, LogLevel::Log, "connection authorized: user=myuser database=mydb application_name=psql" ; "custom15")]
    #[test_case("custom16", "2022-07-22 06:14:23 UTC [76] my-user@my-db 1.2.3.4 LOG:  disconnection: session time: 0:00:01.667 user=my-user database=my-db host=1.2.3.4 port=5678", "my-user", "my-db", 76, LogLevel::Log, "disconnection: session time: 0:00:01.667 user=my-user database=my-db host=1.2.3.4 port=5678" ; "custom16")]
    #[test_case("simple", "2018-05-04 03:06:18.360 UTC [3184] LOG:  pganalyze-collector-identify: server1", "", "", 3184, LogLevel::Log, "pganalyze-collector-identify: server1" ; "simple")]
    #[test_case("heroku1", " sql_error_code = 28000 FATAL:  no pg_hba.conf entry for host \"127.0.0.1\", user \"postgres\", database \"postgres\", SSL off", "", "", 0, LogLevel::Fatal, "no pg_hba.conf entry for host \"127.0.0.1\", user \"postgres\", database \"postgres\", SSL off" ; "heroku1")]
    #[test_case("heroku2", " sql_error_code = 28000 time_ms = \"2022-06-02 22:48:20.807 UTC\" pid=\"11666\" proc_start_time=\"2022-06-02 22:48:20 UTC\" session_id=\"62993e34.2d92\" vtid=\"6/17007\" tid=\"0\" log_line=\"1\" database=\"postgres\" connection_source=\"127.0.0.1(36532)\" user=\"postgres\" application_name=\"[unknown]\" FATAL:  no pg_hba.conf entry for host \"127.0.0.1\", user \"postgres\", database \"postgres\", SSL off", "postgres", "postgres", 11666, LogLevel::Fatal, "no pg_hba.conf entry for host \"127.0.0.1\", user \"postgres\", database \"postgres\", SSL off" ; "heroku2")]
    fn test_parse_supported_prefix(
        name: &str,
        line: &str,
        username: &str,
        database: &str,
        pid: i32,
        level: LogLevel,
        content: &str,
    ) {
        let ParseOutcome::Line(l) = parse(name, line) else {
            panic!("{} did not parse: {}", name, line);
        };
        assert_eq!(l.username, username);
        assert_eq!(l.database, database);
        assert_eq!(l.backend_pid, pid);
        assert_eq!(l.log_level, level);
        assert_eq!(l.content, content);
    }

    // ── Field details ───────────────────────────────────────────

    #[test]
    fn test_timestamps() {
        let ParseOutcome::Line(l) = parse("simple", "2018-05-04 03:06:18.360 +0100 [3184] LOG:  x") else {
            panic!("expected line");
        };
        assert_eq!(l.occurred_at, ms(2018, 5, 4, 2, 6, 18, 360));

        let ParseOutcome::Line(l) = parse("simple", "2022-12-23 09:53:43.862 -03 [790081] LOG: x") else {
            panic!("expected line");
        };
        assert_eq!(l.occurred_at, ms(2022, 12, 23, 12, 53, 43, 862));

        // %s is captured but only %m sets the time
        let ParseOutcome::Line(l) = parse(
            "custom13",
            "27-2021-11-17 19:06:14 UTC-619552a6.1b-1----2021-11-17 19:06:14.946 UTC LOG:  database system was shut down at 2021-11-17 19:01:42 UTC",
        ) else {
            panic!("expected line");
        };
        assert_eq!(l.occurred_at, ms(2021, 11, 17, 19, 6, 14, 946));
        assert_eq!(l.log_line_number, 1);
    }

    #[test]
    fn test_configured_zone() {
        let tz: Tz = "Europe/London".parse().unwrap();
        let parser = PrefixParser::new(template("custom3"), Some(tz));
        let ParseOutcome::Line(l) = parser.parse_line(
            "2018-09-27 06:57:01.030 BST [20194] [user=[unknown],db=[unknown],app=[unknown]] LOG:  connection received: host=[local]",
        ) else {
            panic!("expected line");
        };
        assert_eq!(l.occurred_at, ms(2018, 9, 27, 5, 57, 1, 30));
        assert_eq!(l.username, "");
    }

    #[test]
    fn test_unresolvable_time_still_parses() {
        let ParseOutcome::Line(l) = parse("simple", "2018-05-04 03:06:18.360 XYZ [3184] LOG:  hello") else {
            panic!("expected line");
        };
        assert!(l.occurred_at.is_none());
        assert_eq!(l.content, "hello");
    }

    #[test]
    fn test_application_names() {
        let ParseOutcome::Line(l) = parse(
            "custom3",
            "2018-09-27 06:57:02.779 UTC [20194] [user=postgres,db=postgres,app=sidekiq 1.2.3 queues:something[0 of 50 busy]] LOG:  duration: 3000.019 ms  statement: SELECT pg_sleep(3);",
        ) else {
            panic!("expected line");
        };
        assert_eq!(l.application, "sidekiq 1.2.3 queues:something[0 of 50 busy]");

        let ParseOutcome::Line(l) = parse(
            "custom11",
            "pid=8284,user=[unknown],db=[unknown],app=why would you[] name your application this,client=[local] LOG: connection received: host=[local]",
        ) else {
            panic!("expected line");
        };
        assert_eq!(l.application, "why would you[] name your application this");

        let ParseOutcome::Line(l) = parse(
            "custom9",
            "2020-05-21 17:54:43.808 UTC 172.18.0.1(56402) pgaweb psql [5ec6c05b.22] [34] LOG:  disconnection: session time: 0:00:08.574",
        ) else {
            panic!("expected line");
        };
        assert_eq!(l.application, "psql");
        assert_eq!(l.client_host, "172.18.0.1");
    }

    #[test]
    fn test_multiline_content_keeps_newline() {
        let ParseOutcome::Line(l) = parse(
            "custom3",
            "2018-09-27 06:57:02.779 UTC [20194] [user=postgres,db=postgres,app=psql] LOG:  duration: 3000.019 ms  statement: SELECT pg_sleep(3\n",
        ) else {
            panic!("expected line");
        };
        assert_eq!(l.content, "duration: 3000.019 ms  statement: SELECT pg_sleep(3\n");
    }

    // ── Continuations ───────────────────────────────────────────

    #[test]
    fn test_unmatched_line_is_continuation() {
        let outcome = parse("simple", "\tAND id = 1\n");
        assert_eq!(
            outcome,
            ParseOutcome::Continuation(LogLine::with_content("\tAND id = 1\n", LogLevel::Unknown))
        );
    }

    #[test]
    fn test_empty_prefix_is_always_continuation() {
        let parser = PrefixParser::new("", None);
        assert!(!parser.parse_line("2018-05-04 03:06:18.360 UTC [3184] LOG:  hi").is_line());
    }

    #[test]
    fn test_unknown_level_word_is_unknown_level() {
        let ParseOutcome::Line(l) = parse("simple", "2018-05-04 03:06:18.360 UTC [3184] something: else") else {
            panic!("expected line");
        };
        assert_eq!(l.log_level, LogLevel::Unknown);
    }

    #[test]
    fn test_detect() {
        let parser = PrefixParser::new(template("custom2"), None);
        let hit = parser.detect("2018-09-28 07:37:59 UTC [331-1] postgres@postgres LOG:  connection received");
        assert_eq!(hit.template.as_deref(), Some(template("custom2")));
        assert!(hit.is_high_confidence());
        let miss = parser.detect("garbage");
        assert_eq!(miss.confidence, 0.0);
    }
}
