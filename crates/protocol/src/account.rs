//! Account identifier helpers.

/// Domain appended to bare phone numbers when addressing a user.
pub const USER_DOMAIN: &str = "s.whatsapp.net";

/// Extracts the account number from a full user id.
///
/// The transport reports ids such as `628111:12@s.whatsapp.net`, where the part
/// after `:` is the device index. Observers only care about the number.
pub fn account_number(user_id: &str) -> &str {
	let bare = user_id.split('@').next().unwrap_or(user_id);
	bare.split(':').next().unwrap_or(bare)
}

/// Normalises a destination into a transport address.
///
/// Bare numbers (optionally with `+`, spaces or dashes) gain [`USER_DOMAIN`];
/// anything that already carries a domain is passed through untouched.
/// Returns `None` when there is no number to address.
pub fn to_address(destination: &str) -> Option<String> {
	let trimmed = destination.trim();
	if let Some((user, domain)) = trimmed.split_once('@') {
		return (!user.is_empty() && !domain.is_empty()).then(|| trimmed.to_string());
	}
	let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();
	(!digits.is_empty()).then(|| format!("{digits}@{USER_DOMAIN}"))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn account_number_strips_device_and_domain() {
		assert_eq!(account_number("628111:12@s.whatsapp.net"), "628111");
		assert_eq!(account_number("628111@s.whatsapp.net"), "628111");
		assert_eq!(account_number("628111"), "628111");
	}

	#[test]
	fn to_address_appends_domain_to_numbers() {
		assert_eq!(to_address("6281234567890").as_deref(), Some("6281234567890@s.whatsapp.net"));
		assert_eq!(to_address("+62 812-3456").as_deref(), Some("628123456@s.whatsapp.net"));
	}

	#[test]
	fn to_address_keeps_existing_domain() {
		assert_eq!(to_address("12036302@g.us").as_deref(), Some("12036302@g.us"));
	}

	#[test]
	fn to_address_rejects_destinations_without_a_number() {
		assert_eq!(to_address(""), None);
		assert_eq!(to_address("abc"), None);
		assert_eq!(to_address("@s.whatsapp.net"), None);
	}
}
