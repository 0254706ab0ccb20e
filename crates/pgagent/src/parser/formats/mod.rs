/// Line readers for the supported log transports

pub mod prefix;
pub mod syslog;
pub mod heroku;

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;

// Re-export parser implementations
pub use prefix::PrefixParser;
pub use syslog::SyslogParser;
pub use heroku::{strip_drain_wrapper, HerokuDrainParser};

/// Transport wrapper at the start of a continued physical line: an rsyslog
/// header with its `[n-m]` segment, or a Heroku drain `[COLOR] [n-m]` tag.
static CONTINUATION_WRAPPER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?m)^(?:\w+\s+\d+ \d{2}:\d{2}:\d{2} \S+ \w+\[\d+\]: (?:\[[\d-]+\] )?",
        r"|(?:\w+ \d+ \d+:\d+:\d+ \w+ app\[postgres\] \w+ )?\[\w+\] \[\d+-\d+\] )"
    ))
    .expect("valid continuation wrapper regex")
});

/// Text of a multi-line message without the transport wrappers between its
/// physical lines, and with syslog's `#011` turned back into tabs.
///
/// Line content keeps the raw bytes so offsets stay valid; this is for text
/// derived from it, such as query samples.
pub fn unwrap_continuations(text: &str) -> Cow<'_, str> {
    let unwrapped = CONTINUATION_WRAPPER.replace_all(text, "");
    if unwrapped.contains("#011") {
        Cow::Owned(unwrapped.replace("#011", "\t"))
    } else {
        unwrapped
    }
}
