//! Reconnect decisions and backoff.
//!
//! [`decide`] is a pure, total mapping from a disconnect reason to the action
//! the controller takes. [`Backoff`] bounds how often a reconnecting session
//! may hit the remote endpoint before giving up.

use std::time::Duration;

use pairkeep_protocol::DisconnectReason;

/// What the controller does after a disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectAction {
	/// Reconnect with the stored credentials.
	Reconnect,
	/// Wipe the session's credentials and start over with a new pairing.
	TerminateAndClear,
	/// Stop for good.
	Terminate,
}

/// Action taken for reasons this policy does not recognise.
pub const UNKNOWN_REASON_ACTION: ReconnectAction = ReconnectAction::Reconnect;

pub fn decide(reason: &DisconnectReason) -> ReconnectAction {
	match reason {
		DisconnectReason::LoggedOut | DisconnectReason::BadSession => ReconnectAction::TerminateAndClear,
		DisconnectReason::LocalFault(_) => ReconnectAction::Terminate,
		DisconnectReason::ConnectionClosed
		| DisconnectReason::ConnectionLost
		| DisconnectReason::ConnectionReplaced
		| DisconnectReason::TimedOut
		| DisconnectReason::RestartRequired
		| DisconnectReason::MultideviceMismatch => ReconnectAction::Reconnect,
		DisconnectReason::Unknown(_) => UNKNOWN_REASON_ACTION,
	}
}

/// Exponential backoff with an attempt cap.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
	pub initial: Duration,
	pub max: Duration,
	pub multiplier: f64,
	pub max_attempts: u32,
}

impl Default for Backoff {
	fn default() -> Self {
		Self {
			initial: Duration::from_millis(500),
			max: Duration::from_secs(30),
			multiplier: 2.0,
			max_attempts: 10,
		}
	}
}

impl Backoff {
	/// Delay before reconnect attempt `attempt` (1-based), or `None` once the
	/// attempt cap is exceeded.
	pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
		if attempt == 0 || attempt > self.max_attempts {
			return None;
		}
		let factor = self.multiplier.powi(attempt.saturating_sub(1).min(i32::MAX as u32) as i32);
		let millis = (self.initial.as_millis() as f64 * factor).min(self.max.as_millis() as f64);
		Some(Duration::from_millis(millis as u64))
	}
}

/// Disconnect policy plus the backoff state of one session.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
	backoff: Backoff,
	attempts: u32,
}

impl ReconnectPolicy {
	pub fn new(backoff: Backoff) -> Self {
		Self { backoff, attempts: 0 }
	}

	pub fn decide(&self, reason: &DisconnectReason) -> ReconnectAction {
		decide(reason)
	}

	/// Records a reconnect attempt and returns how long to wait before it.
	/// `None` means the circuit is open and the session should terminate.
	pub fn next_delay(&mut self) -> Option<Duration> {
		self.attempts = self.attempts.saturating_add(1);
		self.backoff.delay_for(self.attempts)
	}

	/// Clears the attempt counter after a successful connection.
	pub fn reset(&mut self) {
		self.attempts = 0;
	}

	pub fn attempts(&self) -> u32 {
		self.attempts
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn logout_and_rejected_credentials_clear_the_session() {
		assert_eq!(decide(&DisconnectReason::LoggedOut), ReconnectAction::TerminateAndClear);
		assert_eq!(decide(&DisconnectReason::BadSession), ReconnectAction::TerminateAndClear);
	}

	#[test]
	fn network_faults_reconnect() {
		for reason in [
			DisconnectReason::ConnectionClosed,
			DisconnectReason::ConnectionLost,
			DisconnectReason::TimedOut,
			DisconnectReason::RestartRequired,
		] {
			assert_eq!(decide(&reason), ReconnectAction::Reconnect, "{reason}");
		}
	}

	#[test]
	fn local_faults_terminate() {
		assert_eq!(decide(&DisconnectReason::LocalFault("corrupt creds".into())), ReconnectAction::Terminate);
	}

	#[test]
	fn unknown_reasons_follow_the_named_default() {
		assert_eq!(decide(&DisconnectReason::Unknown(499)), UNKNOWN_REASON_ACTION);
		assert_eq!(UNKNOWN_REASON_ACTION, ReconnectAction::Reconnect);
	}

	#[test]
	fn decisions_are_deterministic() {
		let reason = DisconnectReason::from_status_code(440);
		assert_eq!(decide(&reason), decide(&reason.clone()));
	}

	#[test]
	fn backoff_grows_and_caps() {
		let backoff = Backoff {
			initial: Duration::from_millis(100),
			max: Duration::from_millis(350),
			multiplier: 2.0,
			max_attempts: 4,
		};
		assert_eq!(backoff.delay_for(1), Some(Duration::from_millis(100)));
		assert_eq!(backoff.delay_for(2), Some(Duration::from_millis(200)));
		assert_eq!(backoff.delay_for(3), Some(Duration::from_millis(350)));
		assert_eq!(backoff.delay_for(4), Some(Duration::from_millis(350)));
		assert_eq!(backoff.delay_for(5), None);
	}

	#[test]
	fn policy_opens_circuit_and_resets() {
		let mut policy = ReconnectPolicy::new(Backoff {
			max_attempts: 2,
			..Backoff::default()
		});
		assert!(policy.next_delay().is_some());
		assert!(policy.next_delay().is_some());
		assert!(policy.next_delay().is_none());
		policy.reset();
		assert_eq!(policy.attempts(), 0);
		assert!(policy.next_delay().is_some());
	}
}
