use gateway_controller_k8s_api::Condition;

/// Merges `updates` into `existing`.
///
/// A condition replaces any existing condition of the same type and all
/// other conditions are preserved. The existing `lastTransitionTime` is kept
/// unless the condition's status actually changed.
pub fn merge(
    existing: &[Condition],
    updates: impl IntoIterator<Item = Condition>,
) -> Vec<Condition> {
    let mut merged = existing.to_vec();
    for mut cond in updates {
        match merged.iter_mut().find(|c| c.type_ == cond.type_) {
            Some(prior) => {
                if prior.status == cond.status {
                    cond.last_transition_time = prior.last_transition_time.clone();
                }
                *prior = cond;
            }
            None => merged.push(cond),
        }
    }
    merged
}

/// Returns `updates` as the complete set of conditions.
///
/// Existing conditions only contribute the `lastTransitionTime` of a
/// condition whose type and status are unchanged. Types missing from
/// `updates` are dropped.
pub fn replace(
    existing: &[Condition],
    updates: impl IntoIterator<Item = Condition>,
) -> Vec<Condition> {
    updates
        .into_iter()
        .map(|mut cond| {
            if let Some(prior) = existing
                .iter()
                .find(|c| c.type_ == cond.type_ && c.status == cond.status)
            {
                cond.last_transition_time = prior.last_transition_time.clone();
            }
            cond
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};
    use gateway_controller_core::conditions::{self, reasons, types};
    use pretty_assertions::assert_eq;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::UNIX_EPOCH + Duration::seconds(secs)
    }

    #[test]
    fn merge_is_idempotent() {
        let first = conditions::new(types::ACCEPTED, true, reasons::ACCEPTED, "", Some(1), at(1));
        let again = conditions::new(types::ACCEPTED, true, reasons::ACCEPTED, "", Some(1), at(2));

        let once = merge(&[], [first.clone()]);
        let twice = merge(&once, [again]);
        assert_eq!(twice, vec![first]);
    }

    #[test]
    fn status_change_updates_transition_time() {
        let accepted =
            conditions::new(types::ACCEPTED, true, reasons::ACCEPTED, "", Some(1), at(1));
        let rejected = conditions::new(
            types::ACCEPTED,
            false,
            reasons::NO_MATCHING_PARENT,
            "no listener",
            Some(2),
            at(5),
        );

        let merged = merge(&[accepted], [rejected.clone()]);
        assert_eq!(merged, vec![rejected]);
    }

    #[test]
    fn same_status_takes_new_reason() {
        let old = conditions::new(
            types::RESOLVED_REFS,
            false,
            reasons::BACKEND_NOT_FOUND,
            "missing",
            Some(1),
            at(1),
        );
        let new = conditions::new(
            types::RESOLVED_REFS,
            false,
            reasons::REF_NOT_PERMITTED,
            "denied",
            Some(2),
            at(9),
        );

        let merged = merge(&[old], [new]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].reason, reasons::REF_NOT_PERMITTED);
        assert_eq!(merged[0].observed_generation, Some(2));
        assert_eq!(merged[0].last_transition_time.0, at(1));
    }

    #[test]
    fn other_types_are_preserved() {
        let programmed =
            conditions::new(types::PROGRAMMED, true, reasons::PROGRAMMED, "", None, at(1));
        let accepted = conditions::new(types::ACCEPTED, true, reasons::ACCEPTED, "", None, at(2));

        let merged = merge(&[programmed.clone()], [accepted.clone()]);
        assert_eq!(merged, vec![programmed, accepted]);
    }

    #[test]
    fn replace_drops_unreported_types() {
        let conflicted = conditions::new(
            types::CONFLICTED,
            true,
            reasons::HOSTNAME_CONFLICT,
            "",
            Some(1),
            at(1),
        );
        let programmed =
            conditions::new(types::PROGRAMMED, false, reasons::INVALID, "", Some(1), at(1));
        let unavailable = conditions::new(
            types::ACCEPTED,
            false,
            reasons::PORT_UNAVAILABLE,
            "",
            Some(2),
            at(5),
        );
        let still_invalid =
            conditions::new(types::PROGRAMMED, false, reasons::INVALID, "", Some(2), at(5));

        let replaced = replace(
            &[conflicted, programmed],
            [unavailable.clone(), still_invalid.clone()],
        );
        assert_eq!(replaced.len(), 2);
        assert_eq!(replaced[0], unavailable);
        assert_eq!(replaced[1].observed_generation, Some(2));
        assert_eq!(replaced[1].last_transition_time.0, at(1));
    }
}
