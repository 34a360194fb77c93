use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

mod common;

#[test]
fn test_malformed_csv_handling() {
    let enrollments = common::enrollments_csv(&[
        // Valid
        "1, 11, 5, Rust, installment, active, 10, USD, 3, 1, 2026-03-20, granted, 2026-02-18T09:00:00Z",
        // Unknown payment type
        "2, 12, 5, Rust, monthly, active, 10, USD, 3, 1, 2026-03-20, granted, 2026-02-18T09:00:00Z",
        // Lowercase currency
        "3, 13, 5, Rust, installment, active, 10, usd, 3, 1, 2026-03-20, granted, 2026-02-18T09:00:00Z",
        // Unparseable due date
        "4, 14, 5, Rust, installment, active, 10, USD, 3, 1, 20-03-2026, granted, 2026-02-18T09:00:00Z",
        // Zero amount
        "5, 15, 5, Rust, installment, active, 0, USD, 3, 1, 2026-03-20, granted, 2026-02-18T09:00:00Z",
        // Valid again
        "6, 16, 5, Rust, installment, active, 10, USD, 3, 2, 2026-03-25, granted, 2026-02-18T09:00:00Z",
    ]);

    let mut cmd = Command::new(cargo_bin!("enrollment-billing"));
    cmd.args(["sweep", "--today", "2026-03-15"]).arg(enrollments.path());

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Error reading enrollment"))
        .stdout(predicate::str::contains("1,11,Rust,false,5,10,USD,2026-03-20"))
        .stdout(predicate::str::contains("6,16,Rust,false,10,10,USD,2026-03-25"))
        .stdout(predicate::str::contains("\n2,").not())
        .stdout(predicate::str::contains("\n5,").not());
}

#[test]
fn test_invariant_violations_are_skipped() {
    let enrollments = common::enrollments_csv(&[
        // Paid more than the plan allows
        "1, 11, 5, Rust, installment, active, 10, USD, 3, 4, 2026-03-20, granted, 2026-02-18T09:00:00Z",
        // Open installment without a due date
        "2, 12, 5, Rust, installment, active, 10, USD, 3, 1, , granted, 2026-02-18T09:00:00Z",
        // Restricted while active
        "3, 13, 5, Rust, installment, active, 10, USD, 3, 1, 2026-03-20, restricted, 2026-02-18T09:00:00Z",
        // Full payment spread over installments
        "4, 14, 5, Rust, full, pending, 10, USD, 3, 0, , granted, 2026-02-18T09:00:00Z",
        "5, 15, 5, Rust, installment, active, 10, USD, 3, 1, 2026-03-20, granted, 2026-02-18T09:00:00Z",
    ]);

    let mut cmd = Command::new(cargo_bin!("enrollment-billing"));
    cmd.args(["sweep", "--today", "2026-03-15"]).arg(enrollments.path());

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Validation error").count(4))
        .stdout(predicate::str::contains("5,15,Rust,false,5,10,USD,2026-03-20"));
}

#[test]
fn test_invalid_payment_rows() {
    let payments = common::payments_csv(&["1, not_a_number", "abc, 49.99", "1, -49.99", "1, 49.99"]);

    let mut cmd = Command::new(cargo_bin!("enrollment-billing"));
    cmd.args(["sweep", common::FIXTURE, "--today", common::FIXTURE_TODAY])
        .arg("--payments")
        .arg(payments.path());

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Error reading payment"))
        .stdout(predicate::str::contains(
            "1,101,Rust Fundamentals,false,35,49.99,USD,2026-04-19",
        ));
}

#[test]
fn test_duplicate_enrollment_ids_keep_first() {
    let enrollments = common::enrollments_csv(&[
        "1, 11, 5, First, installment, active, 10, USD, 3, 1, 2026-03-20, granted, 2026-02-18T09:00:00Z",
        "1, 11, 5, Second, installment, active, 10, USD, 3, 1, 2026-03-22, granted, 2026-02-18T09:00:00Z",
    ]);

    let mut cmd = Command::new(cargo_bin!("enrollment-billing"));
    cmd.args(["sweep", "--today", "2026-03-15"]).arg(enrollments.path());

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("1,11,First,false,5,10,USD,2026-03-20"))
        .stdout(predicate::str::contains("Second").not());
}
