//! Internal testing utilities for the onnx-coreml crates.

use std::fmt::Debug;
use std::panic::{RefUnwindSafe, UnwindSafe};

/// Run a table of test cases through one test function.
///
/// Converter tests are mostly tables of small node configurations paired
/// with the layers they are expected to produce. Each table is written as an
/// array of `Case` structs and run with `test_each`:
///
/// ```
/// use onnx_coreml_testing::TestCases;
///
/// #[derive(Debug)]
/// struct Case {
///     rank: usize,
///     expected_perm: Vec<i64>,
/// }
///
/// let cases = [
///     Case { rank: 2, expected_perm: vec![-1, -2] },
///     Case { rank: 3, expected_perm: vec![-1, -2, -3] },
/// ];
///
/// cases.test_each(|case| {
///     let perm: Vec<i64> = (1..=case.rank as i64).map(|i| -i).collect();
///     assert_eq!(perm, case.expected_perm);
/// });
/// ```
///
/// Every case is run even if an earlier one fails. Panics are caught, and
/// once all cases have run `test_each` panics with the number of failures
/// and the debug representation of each failing case.
///
/// Cases and anything the test closure captures must be unwind safe. Cases
/// that hold types with interior mutability (such as a `Node`, which tracks
/// attribute reads) should instead describe how to build that value, and
/// build it inside the closure.
pub trait TestCases {
    /// The data for a single test case.
    type Case;

    /// Call `test` with a reference to each case, catching panics.
    fn test_each(self, test: impl Fn(&Self::Case) + RefUnwindSafe)
    where
        Self::Case: Debug + RefUnwindSafe;

    /// Variant of [`test_each`](TestCases::test_each) which passes each case
    /// by value.
    ///
    /// The case is formatted before the test function runs so that it can
    /// still be reported if the test panics.
    fn test_each_value(self, test: impl Fn(Self::Case) + RefUnwindSafe)
    where
        Self::Case: Debug + UnwindSafe;
}

fn report_failures<T: Debug>(failures: &[T]) {
    assert!(
        failures.is_empty(),
        "{} test cases failed: {:?}",
        failures.len(),
        failures
    );
}

impl<I: IntoIterator> TestCases for I {
    type Case = I::Item;

    fn test_each(self, test: impl Fn(&I::Item) + RefUnwindSafe)
    where
        Self::Case: Debug + RefUnwindSafe,
    {
        let failures: Vec<_> = self
            .into_iter()
            .filter(|case| std::panic::catch_unwind(|| test(case)).is_err())
            .collect();
        report_failures(&failures);
    }

    fn test_each_value(self, test: impl Fn(I::Item) + RefUnwindSafe)
    where
        Self::Case: Debug + UnwindSafe,
    {
        let mut failures = Vec::new();
        for case in self {
            let case_str = format!("{:?}", case);
            let test = &test;
            if std::panic::catch_unwind(move || test(case)).is_err() {
                failures.push(case_str);
            }
        }
        report_failures(&failures);
    }
}

#[cfg(test)]
mod tests {
    use super::TestCases;

    #[derive(Debug)]
    struct Case {
        axis: i64,
    }

    #[test]
    fn test_all_cases_pass() {
        let cases = [Case { axis: 0 }, Case { axis: -1 }];
        cases.test_each(|case| assert!(case.axis <= 0));

        let cases = [Case { axis: 1 }, Case { axis: 2 }];
        cases.test_each_value(|case| assert!(case.axis > 0));
    }

    #[test]
    #[should_panic(expected = "1 test cases failed")]
    fn test_each_reports_failures() {
        let cases = [Case { axis: 0 }, Case { axis: 3 }];
        cases.test_each(|case| assert!(case.axis < 3, "axis out of range"));
    }

    #[test]
    #[should_panic(expected = "2 test cases failed")]
    fn test_each_value_reports_failures() {
        let cases = [Case { axis: 4 }, Case { axis: 5 }];
        cases.test_each_value(|case| assert!(case.axis < 3, "axis out of range"));
    }
}
