use crate::request::CandidateCredential;

/// Returns the ids of the enumerated `candidates` that appear in `allow_credentials`.
///
/// The result follows the order in which the device enumerated its credentials and
/// contains each id at most once. When `require_third_party_payment` is set, only payment
/// credentials can match.
#[must_use]
pub fn matching_credential_ids(
    candidates: &[CandidateCredential],
    allow_credentials: &[Vec<u8>],
    require_third_party_payment: bool,
) -> Vec<Vec<u8>> {
    let mut matches: Vec<Vec<u8>> = Vec::new();
    for candidate in candidates {
        if require_third_party_payment && !candidate.is_payment {
            continue;
        }
        let id = &candidate.credential_id;
        if allow_credentials.contains(id) && !matches.contains(id) {
            log::debug!("allow-list entry {} found on device", hex::encode(id));
            matches.push(id.clone());
        }
    }
    matches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &[u8], is_payment: bool) -> CandidateCredential {
        CandidateCredential {
            credential_id: id.to_vec(),
            is_discoverable: true,
            is_payment,
        }
    }

    #[test]
    fn test_returns_allowed_ids_present_on_device() {
        let candidates = [candidate(&[1], false), candidate(&[4], false), candidate(&[2], false)];
        let allow = vec![vec![3], vec![2], vec![1]];
        assert_eq!(
            matching_credential_ids(&candidates, &allow, false),
            vec![vec![1], vec![2]]
        );
    }

    #[test]
    fn test_follows_enumeration_order() {
        let candidates = [candidate(&[9], false), candidate(&[5], false), candidate(&[7], false)];
        let allow = vec![vec![7], vec![5], vec![9]];
        assert_eq!(
            matching_credential_ids(&candidates, &allow, false),
            vec![vec![9], vec![5], vec![7]]
        );
    }

    #[test]
    fn test_no_match() {
        let candidates = [candidate(&[1], false)];
        assert!(matching_credential_ids(&candidates, &[vec![9]], false).is_empty());
        assert!(matching_credential_ids(&[], &[vec![1]], false).is_empty());
    }

    #[test]
    fn test_third_party_payment_requires_payment_credentials() {
        let candidates = [candidate(&[1], false), candidate(&[2], true)];
        let allow = vec![vec![1], vec![2]];
        assert_eq!(matching_credential_ids(&candidates, &allow, true), vec![vec![2]]);
    }

    #[test]
    fn test_duplicate_entries_match_once() {
        let candidates = [candidate(&[1], false), candidate(&[1], false)];
        let allow = vec![vec![1], vec![1]];
        assert_eq!(matching_credential_ids(&candidates, &allow, false), vec![vec![1]]);
    }
}
