#![allow(dead_code)]

use std::io::Write;
use std::sync::{Arc, Mutex, OnceLock};

use handover::migration::{
    FeatureSelection, FilterOwnershipOptions, GroupMembershipOptions, IssueReassignmentOptions,
    PickerOptions, RoleMembershipOptions,
};
use handover::primitives::logger::{set_logger, LogLevel, Logger};
use handover::test_utils::InMemoryJira;
use handover::{
    BatchRunner, EngineOptions, JiraClient, MigrationPair, PairReport, ProgressListener,
    RetryPolicy, RunOptions,
};
use tempfile::NamedTempFile;

pub const SINGLE_PICKER_TYPE: &str = "com.atlassian.jira.plugin.system.customfieldtypes:userpicker";
pub const MULTI_PICKER_TYPE: &str =
    "com.atlassian.jira.plugin.system.customfieldtypes:multiuserpicker";

/// Keeps every log line emitted through the foreign logger bridge.
#[derive(Default)]
pub struct CapturingLogger {
    lines: Mutex<Vec<(LogLevel, String)>>,
}

impl CapturingLogger {
    pub fn lines_containing(&self, needle: &str) -> Vec<String> {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, line)| line.contains(needle))
            .map(|(_, line)| line.clone())
            .collect()
    }
}

impl Logger for CapturingLogger {
    fn log(&self, level: LogLevel, message: String) {
        self.lines.lock().unwrap().push((level, message));
    }
}

/// Installs the capturing logger once per test binary.
pub fn capture_logs() -> Arc<CapturingLogger> {
    static LOGGER: OnceLock<Arc<CapturingLogger>> = OnceLock::new();
    LOGGER
        .get_or_init(|| {
            let logger = Arc::new(CapturingLogger::default());
            set_logger(logger.clone());
            logger
        })
        .clone()
}

/// Records listener callbacks.
#[derive(Default)]
pub struct RecordingListener {
    pub started: Mutex<Vec<u32>>,
    pub finished: Mutex<Vec<PairReport>>,
}

impl ProgressListener for RecordingListener {
    fn on_pair_started(&self, index: u32, _pair: MigrationPair) {
        self.started.lock().unwrap().push(index);
    }

    fn on_pair_finished(&self, report: PairReport) {
        self.finished.lock().unwrap().push(report);
    }
}

pub fn new_jira() -> Arc<InMemoryJira> {
    Arc::new(InMemoryJira::new())
}

pub fn client(jira: &Arc<InMemoryJira>, retry: RetryPolicy) -> Arc<JiraClient> {
    Arc::new(JiraClient::new(jira.clone(), jira.base_url(), retry).unwrap())
}

pub fn runner(jira: &Arc<InMemoryJira>, max_concurrent_pairs: u32) -> BatchRunner {
    let options = EngineOptions {
        max_concurrent_pairs,
        retry: RetryPolicy::none(),
    };
    BatchRunner::new(client(jira, options.retry.clone()), options)
}

pub fn pair(source: &str, target: &str) -> MigrationPair {
    MigrationPair::new(source, target)
}

pub fn groups(excluded: &[&str]) -> FeatureSelection {
    FeatureSelection {
        groups: Some(GroupMembershipOptions {
            excluded_groups: excluded.iter().map(|g| (*g).to_string()).collect(),
        }),
        ..FeatureSelection::default()
    }
}

pub fn issues(unresolved_only: bool) -> FeatureSelection {
    FeatureSelection {
        issues: Some(IssueReassignmentOptions { unresolved_only }),
        ..FeatureSelection::default()
    }
}

/// Every resource type, with exports written to temporary files.
pub fn everything(filter_export: &NamedTempFile, role_export: &NamedTempFile) -> FeatureSelection {
    FeatureSelection {
        groups: Some(GroupMembershipOptions::default()),
        filters: Some(FilterOwnershipOptions {
            export_path: filter_export.path().display().to_string(),
        }),
        issues: Some(IssueReassignmentOptions::default()),
        roles: Some(RoleMembershipOptions {
            export_path: role_export.path().display().to_string(),
        }),
        single_picker: Some(PickerOptions::default()),
        multi_picker: Some(PickerOptions::default()),
    }
}

pub fn run_options(features: FeatureSelection, dry_run: bool) -> RunOptions {
    RunOptions { dry_run, features }
}

pub fn write_csv(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}
