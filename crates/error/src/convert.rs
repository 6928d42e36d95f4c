use crate::{ErrorCode, ErrorContext, QuarryError};

impl From<std::io::Error> for QuarryError {
    fn from(err: std::io::Error) -> Self {
        QuarryError::new(ErrorCode::TemplateUnreadable, err.to_string())
    }
}

impl From<serde_json::Error> for QuarryError {
    fn from(err: serde_json::Error) -> Self {
        QuarryError::new(ErrorCode::SerializationFailed, err.to_string())
    }
}

impl From<serde_yaml::Error> for QuarryError {
    fn from(err: serde_yaml::Error) -> Self {
        QuarryError::new(ErrorCode::InvalidConfig, err.to_string())
    }
}

impl From<reqwest::Error> for QuarryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return QuarryError::new(ErrorCode::ConnectionTimeout, err.to_string());
        }
        if err.is_decode() {
            return QuarryError::new(ErrorCode::ResponseDecode, err.to_string());
        }
        let status = err.status().map(|s| s.as_u16());
        QuarryError::new(ErrorCode::ExecutionFailed, err.to_string()).with_context(
            ErrorContext::Warehouse {
                status,
                job_id: None,
            },
        )
    }
}

/// Levenshtein-based suggestion for unknown query names.
pub fn closest_match(target: &str, options: &[String]) -> Option<String> {
    let mut best_match: Option<&str> = None;
    let mut min_distance = usize::MAX;

    for option in options {
        let distance = levenshtein(target, option);
        if distance < min_distance && distance <= 3 {
            min_distance = distance;
            best_match = Some(option.as_str());
        }
    }

    best_match.map(|s| s.to_string())
}

fn levenshtein(a: &str, b: &str) -> usize {
    let len_a = a.chars().count();
    let len_b = b.chars().count();
    let b_chars: Vec<char> = b.chars().collect();
    let mut dp = vec![vec![0; len_b + 1]; len_a + 1];

    for (i, row) in dp.iter_mut().enumerate().take(len_a + 1) {
        row[0] = i;
    }
    for (j, val) in dp[0].iter_mut().enumerate().take(len_b + 1) {
        *val = j;
    }

    for (i, ca) in a.chars().enumerate() {
        for j in 1..=len_b {
            let cost = if ca == b_chars[j - 1] { 0 } else { 1 };
            dp[i + 1][j] = std::cmp::min(
                std::cmp::min(dp[i][j] + 1, dp[i + 1][j - 1] + 1),
                dp[i][j - 1] + cost,
            );
        }
    }

    dp[len_a][len_b]
}
