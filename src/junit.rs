use junit_report::{Duration, ReportBuilder, TestCaseBuilder, TestSuiteBuilder};
use std::path::Path;

use crate::error::TbError;
use crate::test::TestSuite;
use crate::TbResult;

pub(crate) fn write_junit_xml(suite: &TestSuite, path: &Path) -> TbResult<()> {
    let mut test_cases = Vec::new();

    for t in suite.iter() {
        let time = Duration::seconds_f64(t.time_secs);
        let tc = match &t.result {
            Some(Ok(_)) => TestCaseBuilder::success(&t.name, time),
            Some(Err(e)) => TestCaseBuilder::failure(&t.name, time, "failure", &e.to_string()),
            None => TestCaseBuilder::skipped(&t.name),
        }
        .build();
        test_cases.push(tc);
    }

    let test_suite = TestSuiteBuilder::new(suite.name())
        .add_testcases(test_cases)
        .build();
    let report = ReportBuilder::new().add_testsuite(test_suite).build();
    let file = std::fs::File::create(path)?;
    report
        .write_xml(file)
        .map_err(|e| TbError::Report(format!("{:?}", e)))
}
