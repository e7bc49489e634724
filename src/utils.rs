pub fn now_ts() -> f64 {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    now.as_secs_f64()
}

/// "1m23s" style formatting for the elapsed-time readout.
pub fn fmt_elapsed(secs: f64) -> String {
    let s = secs.max(0.0) as u64;
    if s < 60 {
        format!("{}s", s)
    } else if s < 3600 {
        format!("{}m{:02}s", s / 60, s % 60)
    } else {
        format!("{}h{:02}m", s / 3600, (s % 3600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_formatting() {
        assert_eq!(fmt_elapsed(0.4), "0s");
        assert_eq!(fmt_elapsed(59.9), "59s");
        assert_eq!(fmt_elapsed(61.0), "1m01s");
        assert_eq!(fmt_elapsed(3725.0), "1h02m");
    }
}
