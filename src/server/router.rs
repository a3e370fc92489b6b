//! # Command Router
//!
//! Maps a request path to its response body.
//!
//! ## Commands
//!
//! | Path | Response |
//! |------|----------|
//! | `/d` | Orientation snapshot: `a0/a1/a2/0/0/0/0` |
//! | `/c`, `/a`, `/m` | `done` |
//! | `/p` | `0/0/0/0/0/0/0/0/0/0/0/0` |
//!
//! Commands are case-sensitive. Any other path is an [`RouteOutcome::UnknownPath`].

use crate::orientation::{OrientationSnapshot, SharedMotion};

/// Body for acknowledged commands
pub const DONE_RESPONSE: &str = "done";

/// Body for the `/p` command
pub const ZERO_FRAME_RESPONSE: &str = "0/0/0/0/0/0/0/0/0/0/0/0";

/// Placeholder fields appended after the three angles
pub const SNAPSHOT_PLACEHOLDERS: &str = "0/0/0/0";

/// One-letter path command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `d`: current orientation snapshot
    Data,
    /// `c`, `a` or `m`: acknowledged without action
    Acknowledge(char),
    /// `p`: all-zero frame
    ZeroFrame,
}

impl Command {
    /// Decode the command from a request path
    ///
    /// Leading slashes are ignored, so `/d` and `//d` are both [`Command::Data`].
    ///
    /// # Examples
    ///
    /// ```
    /// use imu_bridge::server::router::Command;
    ///
    /// assert_eq!(Command::from_path("/d"), Some(Command::Data));
    /// assert_eq!(Command::from_path("/a"), Some(Command::Acknowledge('a')));
    /// assert_eq!(Command::from_path("/D"), None);
    /// ```
    #[must_use]
    pub fn from_path(path: &str) -> Option<Self> {
        match path.trim_start_matches('/') {
            "d" => Some(Command::Data),
            "c" => Some(Command::Acknowledge('c')),
            "a" => Some(Command::Acknowledge('a')),
            "m" => Some(Command::Acknowledge('m')),
            "p" => Some(Command::ZeroFrame),
            _ => None,
        }
    }
}

/// Result of routing one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Respond with this body
    Reply(String),
    /// No command matches; the request fails without a response
    UnknownPath(String),
}

/// Format a snapshot as `a0/a1/a2/0/0/0/0`
///
/// Angles use Rust's locale-independent shortest round-trip formatting.
///
/// # Examples
///
/// ```
/// use imu_bridge::orientation::OrientationSnapshot;
/// use imu_bridge::server::router::format_snapshot;
///
/// let snapshot = OrientationSnapshot { angles: [-12.5, 0.0, 359.25], last_update: None };
/// assert_eq!(format_snapshot(&snapshot), "-12.5/0/359.25/0/0/0/0");
/// ```
#[must_use]
pub fn format_snapshot(snapshot: &OrientationSnapshot) -> String {
    let [a0, a1, a2] = snapshot.angles;
    format!("{}/{}/{}/{}", a0, a1, a2, SNAPSHOT_PLACEHOLDERS)
}

/// Route a request path, reading the motion state only for `/d`
pub fn route(path: &str, motion: &SharedMotion) -> RouteOutcome {
    match Command::from_path(path) {
        Some(Command::Data) => RouteOutcome::Reply(format_snapshot(&motion.snapshot())),
        Some(Command::Acknowledge(_)) => RouteOutcome::Reply(DONE_RESPONSE.to_string()),
        Some(Command::ZeroFrame) => RouteOutcome::Reply(ZERO_FRAME_RESPONSE.to_string()),
        None => RouteOutcome::UnknownPath(path.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orientation::Vector3;
    use tokio::time::{Duration, Instant};

    fn rotated_motion() -> SharedMotion {
        let motion = SharedMotion::new();
        let t0 = Instant::now();
        motion.apply_angular_velocity(Vector3::ZERO, t0);
        motion.apply_angular_velocity(Vector3::new(0.3, -0.7, 1.1), t0 + Duration::from_millis(1500));
        motion.apply_acceleration(Vector3::new(0.5, 0.5, 0.5), t0 + Duration::from_millis(1500));
        motion
    }

    #[test]
    fn test_command_from_path() {
        assert_eq!(Command::from_path("/d"), Some(Command::Data));
        assert_eq!(Command::from_path("/c"), Some(Command::Acknowledge('c')));
        assert_eq!(Command::from_path("/m"), Some(Command::Acknowledge('m')));
        assert_eq!(Command::from_path("/p"), Some(Command::ZeroFrame));
        assert_eq!(Command::from_path("//d"), Some(Command::Data));
        assert_eq!(Command::from_path("d"), Some(Command::Data));
    }

    #[test]
    fn test_command_is_case_sensitive() {
        for path in ["/D", "/C", "/P", "/dd", "/", "", "/x", "/d/"] {
            assert_eq!(Command::from_path(path), None, "path {:?}", path);
        }
    }

    #[test]
    fn test_ack_commands_reply_done() {
        let motion = rotated_motion();
        for path in ["/c", "/a", "/m"] {
            assert_eq!(route(path, &motion), RouteOutcome::Reply("done".to_string()));
        }
    }

    #[test]
    fn test_zero_frame_ignores_state() {
        let motion = rotated_motion();
        assert_eq!(
            route("/p", &motion),
            RouteOutcome::Reply("0/0/0/0/0/0/0/0/0/0/0/0".to_string())
        );
        assert_eq!(route("/p", &SharedMotion::new()), route("/p", &motion));
    }

    #[test]
    fn test_data_round_trips_angles() {
        let motion = rotated_motion();
        let RouteOutcome::Reply(body) = route("/d", &motion) else {
            panic!("/d should reply");
        };

        let fields: Vec<&str> = body.split('/').collect();
        assert_eq!(fields.len(), 7);
        assert_eq!(&fields[3..], ["0", "0", "0", "0"]);

        let angles = motion.snapshot().angles;
        for (field, angle) in fields[..3].iter().zip(angles) {
            assert_eq!(field.parse::<f32>().unwrap(), angle);
        }
    }

    #[test]
    fn test_data_never_exposes_acceleration() {
        let motion = rotated_motion();
        assert_ne!(motion.acceleration(), [0.0; 3]);

        let RouteOutcome::Reply(body) = route("/d", &motion) else {
            panic!("/d should reply");
        };
        assert!(body.ends_with("/0/0/0/0"));
    }

    #[test]
    fn test_initial_snapshot_format() {
        assert_eq!(
            route("/d", &SharedMotion::new()),
            RouteOutcome::Reply("0/0/0/0/0/0/0".to_string())
        );
    }

    #[test]
    fn test_unknown_path_is_tagged() {
        assert_eq!(
            route("/favicon.ico", &SharedMotion::new()),
            RouteOutcome::UnknownPath("/favicon.ico".to_string())
        );
    }
}
