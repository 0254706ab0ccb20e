use std::collections::BTreeMap;
use std::sync::Arc;

use chrono_tz::Tz;

use super::formats::*;
use super::prefix::SUPPORTED_PREFIXES;
use super::traits::*;

/// Log format detector with adaptive sampling
/// 1. Quick detection on first line (fast path)
/// 2. Multi-line tally if confidence is low
/// 3. Adaptive refinement for uncertain cases
///
/// Each detector is scored by the share of sampled lines it matches. Ties go
/// to the detector registered first, which is why more specific templates
/// sit ahead of the ones they overlap with.
pub struct FormatDetectorOrchestrator {
    detectors: Vec<Box<dyn FormatDetector>>,
}

impl FormatDetectorOrchestrator {
    pub fn new() -> Self {
        let mut detectors: Vec<Box<dyn FormatDetector>> = vec![
            // Order matters! Drain wrappers and syslog headers before bare prefixes
            Box::new(HerokuDrainParser::new(heroku_template("heroku2"))),
            Box::new(HerokuDrainParser::new(heroku_template("heroku1"))),
            Box::new(SyslogParser::new(None)),
        ];
        detectors.extend(
            SUPPORTED_PREFIXES
                .iter()
                .filter(|p| !p.template.is_empty())
                .map(|p| Box::new(PrefixParser::new(p.template, None)) as Box<dyn FormatDetector>),
        );

        Self { detectors }
    }

    pub fn detect_single(&self, sample: &str) -> DetectionResult {
        self.run_detectors(sample)
            .map(|(_, result)| result)
            .unwrap_or_else(DetectionResult::no_match)
    }

    pub fn detect_multi(&self, samples: &[&str]) -> DetectionResult {
        if samples.is_empty() {
            return DetectionResult::no_match();
        }

        // Detector index -> confidences of the lines it won
        let mut votes: BTreeMap<usize, (DetectionResult, Vec<f32>)> = BTreeMap::new();
        for sample in samples {
            if let Some((idx, result)) = self.run_detectors(sample) {
                let confidence = result.confidence;
                votes.entry(idx).or_insert_with(|| (result, Vec::new())).1.push(confidence);
            }
        }

        let total = samples.len() as f32;
        let mut best: Option<(DetectionResult, f32)> = None;

        // BTreeMap iterates in registration order, so strict `>` keeps the earlier detector on ties
        for (result, confidences) in votes.into_values() {
            let avg_confidence = confidences.iter().sum::<f32>() / confidences.len() as f32;
            let score = (confidences.len() as f32 / total) * avg_confidence;

            if best.as_ref().map_or(true, |(_, best_score)| score > *best_score) {
                best = Some((result, score));
            }
        }

        match best {
            Some((result, score)) => DetectionResult::new(result.format, result.template, score),
            None => DetectionResult::no_match(),
        }
    }

    pub fn detect_adaptive(&self, samples: &[&str]) -> DetectionResult {
        if samples.is_empty() {
            return DetectionResult::no_match();
        }

        let initial_sample_size = samples.len().min(super::DETECTION_SAMPLE_SIZE);
        let initial_result = self.detect_multi(&samples[..initial_sample_size]);

        if initial_result.is_high_confidence() {
            return initial_result;
        }

        // Continuation lines dilute the score; look further before settling
        if samples.len() > initial_sample_size {
            let refinement_size = samples.len().min(super::ADAPTIVE_REFINEMENT_SIZE);
            let refined_result = self.detect_multi(&samples[..refinement_size]);

            if refined_result.format != LogFormat::Unknown
                && refined_result.confidence >= initial_result.confidence
            {
                return refined_result;
            }
        }

        initial_result
    }

    /// First detector with the highest confidence for this line.
    fn run_detectors(&self, sample: &str) -> Option<(usize, DetectionResult)> {
        let mut best: Option<(usize, DetectionResult)> = None;

        for (idx, detector) in self.detectors.iter().enumerate() {
            let result = detector.detect(sample);
            let best_confidence = best.as_ref().map_or(0.0, |(_, b)| b.confidence);

            if result.confidence > best_confidence {
                let done = result.confidence >= 0.99;
                best = Some((idx, result));
                if done {
                    break;
                }
            }
        }

        best
    }
}

impl Default for FormatDetectorOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

fn heroku_template(name: &str) -> &'static str {
    SUPPORTED_PREFIXES
        .iter()
        .find(|p| p.name == name)
        .map_or("", |p| p.template)
}

/// Build the line parser a detection result describes.
///
/// Returns `None` when nothing was detected.
pub fn parser_for(result: &DetectionResult, tz: Option<Tz>) -> Option<Arc<dyn LineParser>> {
    let template = result.template.as_deref().unwrap_or_default();
    let parser: Arc<dyn LineParser> = match result.format {
        LogFormat::Prefix => Arc::new(PrefixParser::new(template, tz)),
        LogFormat::Syslog => Arc::new(SyslogParser::new(tz)),
        LogFormat::HerokuDrain => Arc::new(HerokuDrainParser::new(template)),
        LogFormat::Unknown => return None,
    };
    Some(parser)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RDS: &str = "2018-08-22 16:00:04 UTC:ec2-1-1-1-1.compute-1.amazonaws.com(48808):myuser@mydb:[18762]:LOG:  duration: 3668.685 ms  execute <unnamed>: SELECT 1";
    const CUSTOM3: &str = "2018-09-27 06:57:02.779 UTC [20194] [user=postgres,db=postgres,app=psql] ERROR:  canceling statement due to user request";
    const CUSTOM4: &str = "2018-09-27 06:57:02.779 UTC [20194] [user=postgres,db=postgres,app=psql,host=127.0.0.1] ERROR:  canceling statement due to user request";

    fn template(name: &str) -> Option<String> {
        SUPPORTED_PREFIXES
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.template.to_string())
    }

    #[test]
    fn test_detect_single_prefix() {
        let orchestrator = FormatDetectorOrchestrator::new();

        let result = orchestrator.detect_single(RDS);
        assert_eq!(result.format, LogFormat::Prefix);
        assert_eq!(result.template, template("amazon_rds"));
        assert!(result.is_high_confidence());
    }

    #[test]
    fn test_more_specific_template_wins() {
        let orchestrator = FormatDetectorOrchestrator::new();
        assert_eq!(orchestrator.detect_single(CUSTOM4).template, template("custom4"));
        assert_eq!(orchestrator.detect_single(CUSTOM3).template, template("custom3"));
    }

    #[test]
    fn test_detect_single_syslog() {
        let orchestrator = FormatDetectorOrchestrator::new();
        let result = orchestrator.detect_single(
            "Feb  1 21:48:31 ip-172-31-14-41 postgres[9076]: [3-1] LOG:  database system is ready to accept connections",
        );
        assert_eq!(result.format, LogFormat::Syslog);
    }

    #[test]
    fn test_detect_single_heroku_drain() {
        let orchestrator = FormatDetectorOrchestrator::new();
        let result = orchestrator
            .detect_single("[COPPER] [12-1]  sql_error_code = 00000 LOG:  checkpoint starting: time");
        assert_eq!(result.format, LogFormat::HerokuDrain);
        assert_eq!(result.template, template("heroku1"));
    }

    #[test]
    fn test_detect_single_unknown() {
        let orchestrator = FormatDetectorOrchestrator::new();
        let result = orchestrator.detect_single("just some text");
        assert_eq!(result.format, LogFormat::Unknown);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_detect_multi_counts_continuations() {
        let orchestrator = FormatDetectorOrchestrator::new();
        let samples = [CUSTOM3, "\tFROM foo", CUSTOM3, CUSTOM3];

        let result = orchestrator.detect_multi(&samples);
        assert_eq!(result.template, template("custom3"));
        assert!((result.confidence - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_detect_multi_majority() {
        let orchestrator = FormatDetectorOrchestrator::new();
        let samples = [CUSTOM4, CUSTOM3, CUSTOM3];

        let result = orchestrator.detect_multi(&samples);
        assert_eq!(result.template, template("custom3"));
    }

    #[test]
    fn test_adaptive_refines_past_banner() {
        let orchestrator = FormatDetectorOrchestrator::new();
        let samples = [
            "   _____ ",
            "  |  __ |",
            "  | |__) ",
            "starting...",
            "",
            RDS,
            RDS,
            RDS,
        ];

        let result = orchestrator.detect_adaptive(&samples);
        assert_eq!(result.template, template("amazon_rds"));
    }

    #[test]
    fn test_adaptive_high_confidence_fast_path() {
        let orchestrator = FormatDetectorOrchestrator::new();
        let samples = [RDS; 6];

        let result = orchestrator.detect_adaptive(&samples);
        assert!(result.is_high_confidence());
        assert_eq!(result.template, template("amazon_rds"));
    }

    #[test]
    fn test_parser_for_detection() {
        let orchestrator = FormatDetectorOrchestrator::new();
        let parser = parser_for(&orchestrator.detect_single(CUSTOM3), None).unwrap();
        let ParseOutcome::Line(line) = parser.parse_line(CUSTOM3) else {
            panic!("expected a line");
        };
        assert_eq!(line.backend_pid, 20194);
        assert_eq!(line.username, "postgres");

        assert!(parser_for(&DetectionResult::no_match(), None).is_none());
    }
}
