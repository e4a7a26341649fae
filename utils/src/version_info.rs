//! Build metadata, populated at compile time by `build.rs`.
//!
//! The service decides its environment at runtime, so the version label is
//! computed from a [`RuntimeEnv`]:
//! - PR: `pr:{number}`
//! - Prod: `stable:{version}`
//! - Nightly: `nightly:{date}`
//! - Internal: `internal:{commit}`
//! - Test-Internal: `test-internal:{commit}`
//! - Test/Local: `main:{commit}`

/// Deployment environment known only at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeEnv {
    Local,
    Prod,
    Internal,
    Test,
    TestInternal,
    Pr,
    Nightly,
}

/// Build timestamp in RFC3339.
pub fn build_date() -> &'static str {
    env!("BUILD_DATE")
}

/// Short git commit hash, or `unknown` outside a checkout.
pub fn build_commit() -> &'static str {
    env!("BUILD_COMMIT")
}

pub fn build_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Format the `x-service-version` value for an environment.
pub fn format_version_for_runtime_env(env: RuntimeEnv) -> String {
    match env {
        RuntimeEnv::Pr => {
            let pr_number = option_env!("PR_NUMBER").unwrap_or("unknown");
            format!("pr:{pr_number}")
        }
        RuntimeEnv::Nightly => {
            let date = build_date();
            // RFC3339 is ASCII, so slicing the date part is safe when long enough.
            let date_part = date.get(..10).unwrap_or(date);
            format!("nightly:{date_part}")
        }
        RuntimeEnv::Internal => format!("internal:{}", build_commit()),
        RuntimeEnv::TestInternal => format!("test-internal:{}", build_commit()),
        RuntimeEnv::Test | RuntimeEnv::Local => format!("main:{}", build_commit()),
        RuntimeEnv::Prod => format!("stable:{}", build_version()),
    }
}
