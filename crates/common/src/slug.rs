// Opaque slug generation for externally addressable identifiers.
//
// Slugs are short, stable, user-facing ids distinct from the database
// primary key. Each entity kind carries a one-letter prefix so a slug's
// kind is recognizable at a glance: W = workspace, C = channel,
// D = member (DM target), M = message, F = file.

use rand::Rng;

const ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Short slug body length; with the prefix the full slug is 13 chars.
const SLUG_LENGTH: usize = 12;
/// Long slug body length; with the prefix the full slug is 22 chars.
const BIG_SLUG_LENGTH: usize = 21;
const INVITE_CODE_LENGTH: usize = 6;

fn random_body(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length).map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char).collect()
}

pub fn workspace_slug() -> String {
    format!("W{}", random_body(SLUG_LENGTH))
}

pub fn channel_slug() -> String {
    format!("C{}", random_body(SLUG_LENGTH))
}

pub fn member_slug() -> String {
    format!("D{}", random_body(SLUG_LENGTH))
}

pub fn message_slug() -> String {
    format!("M{}", random_body(BIG_SLUG_LENGTH))
}

pub fn file_slug() -> String {
    format!("F{}", random_body(BIG_SLUG_LENGTH))
}

pub fn invite_code() -> String {
    random_body(INVITE_CODE_LENGTH)
}

/// Derive a display name from the local part of an email address.
///
/// `jane.doe@example.com` becomes `Jane Doe`: the local part is split on
/// `.`, `_` and `-`, each piece capitalized, and the pieces joined with
/// spaces.
pub fn username_from_email(email: &str) -> String {
    let local = email.split('@').next().unwrap_or(email);

    local
        .split(['.', '_', '-'])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn workspace_name_from_email(email: &str) -> String {
    format!("{} Workspace", username_from_email(email))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugs_carry_kind_prefix_and_fixed_length() {
        assert!(workspace_slug().starts_with('W'));
        assert_eq!(workspace_slug().len(), 13);
        assert!(channel_slug().starts_with('C'));
        assert_eq!(channel_slug().len(), 13);
        assert!(member_slug().starts_with('D'));
        assert_eq!(member_slug().len(), 13);
        assert!(message_slug().starts_with('M'));
        assert_eq!(message_slug().len(), 22);
        assert!(file_slug().starts_with('F'));
        assert_eq!(file_slug().len(), 22);
    }

    #[test]
    fn slug_bodies_use_uppercase_alphanumerics_only() {
        let slug = message_slug();
        assert!(slug[1..].chars().all(|ch| ch.is_ascii_digit() || ch.is_ascii_uppercase()));
    }

    #[test]
    fn username_capitalizes_email_local_parts() {
        assert_eq!(username_from_email("jane.doe@example.com"), "Jane Doe");
        assert_eq!(username_from_email("bob_smith-jr@example.com"), "Bob Smith Jr");
        assert_eq!(username_from_email("solo@example.com"), "Solo");
    }

    #[test]
    fn workspace_name_appends_suffix() {
        assert_eq!(workspace_name_from_email("jane@example.com"), "Jane Workspace");
    }
}
