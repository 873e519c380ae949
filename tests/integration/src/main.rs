//! Integration test harness
//!
//! Runs every integration test category against the loopback runtime and
//! prints a summary.
//!
//! # Usage
//!
//! Run all categories:
//! ```text
//! cargo run -p integration-tests
//! ```
//!
//! Run one category:
//! ```text
//! cargo test -p integration-tests --test binding_tests
//! cargo test -p integration-tests --test session_tests
//! cargo test -p integration-tests --test async_wait_tests
//! cargo test -p integration-tests --test client_tests
//! ```
//!
//! Run with session-layer logging:
//! ```text
//! RUST_LOG=exrpc=debug cargo run -p integration-tests
//! ```


use common::{CategoryResult, TestSuiteResults};
use std::process::Command;
use std::time::Instant;

#[derive(Debug, Clone)]
struct TestCategory {
    name: &'static str,
    description: &'static str,
    test_name: &'static str,
}

const TEST_CATEGORIES: &[TestCategory] = &[
    TestCategory {
        name: "Binding Tests",
        description: "String binding, transport resolution and security policy",
        test_name: "binding_tests",
    },
    TestCategory {
        name: "Session Tests",
        description: "Connect, ROP transfer, push registration and state machine",
        test_name: "session_tests",
    },
    TestCategory {
        name: "Async Wait Tests",
        description: "Notification wait polling, deadline and completion",
        test_name: "async_wait_tests",
    },
    TestCategory {
        name: "Client Tests",
        description: "Client facade, SPN expansion and connect retry",
        test_name: "client_tests",
    },
];

fn print_categories() {
    println!("{}", "=".repeat(80));
    println!("exrpc integration test suite");
    println!("{}", "=".repeat(80));
    for (i, cat) in TEST_CATEGORIES.iter().enumerate() {
        println!("  {}. {} - {}", i + 1, cat.name, cat.description);
    }
    println!("{}", "-".repeat(80));
}

fn run_category(category: &TestCategory) -> CategoryResult {
    println!("\nRunning: {}", category.name);

    let start = Instant::now();
    let output = Command::new("cargo")
        .args(["test", "-p", "integration-tests", "--test", category.test_name])
        .output();
    let duration = start.elapsed();

    let (passed, summary) = match output {
        Ok(output) => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            if !stdout.is_empty() {
                println!("{}", stdout);
            }
            if output.status.success() {
                (true, "PASSED".to_string())
            } else {
                eprintln!("{}", String::from_utf8_lossy(&output.stderr));
                (false, format!("FAILED (exit code: {:?})", output.status.code()))
            }
        }
        Err(e) => (false, format!("Failed to execute: {}", e)),
    };

    CategoryResult {
        name: category.name,
        passed,
        duration,
        summary,
    }
}

fn main() {
    print_categories();

    let total_start = Instant::now();
    let mut results = TestSuiteResults::default();
    for category in TEST_CATEGORIES {
        results.record(run_category(category));
    }

    println!("\n{}", "=".repeat(80));
    println!(
        "Categories: {} | Passed: {} | Failed: {} | Duration: {:?}",
        results.categories.len(),
        results.passed(),
        results.failed(),
        total_start.elapsed()
    );
    println!("{:<20} {:<8} {:<15} Details", "Category", "Status", "Duration");
    println!("{}", "-".repeat(80));
    for result in &results.categories {
        let status = if result.passed { "PASS" } else { "FAIL" };
        println!(
            "{:<20} {:<8} {:<15?} {}",
            result.name, status, result.duration, result.summary
        );
    }

    std::process::exit(if results.failed() > 0 { 1 } else { 0 });
}
