use bson::doc;

use crate::db::{GroupCollection, PeerCollection};
use crate::error::FatalError;
use crate::model::Group;

use super::TICK;

/// Runs forever, ticking once a second, only on the server configured
/// as `is_main_server`: cascades each group's `allowedUsage`/disabled
/// state down onto its member peers. Grounded in `main.go`'s group
/// update goroutine, which returns immediately on non-main servers
/// rather than looping — here that's a condition on whether this task
/// gets spawned at all, checked by the caller before calling this fn.
/// An unrecoverable database error aborts the loop entirely, matching
/// the original goroutine's `panic(err)` on the same failures; the
/// caller runs this under the same fatal-exit supervision as the
/// change-stream consumers.
pub async fn run_group_loop(groups: GroupCollection, peers: PeerCollection) -> Result<(), FatalError> {
    let mut interval = tokio::time::interval(TICK);
    loop {
        interval.tick().await;
        tick(&groups, &peers).await?;
    }
}

async fn tick(groups: &GroupCollection, peers: &PeerCollection) -> Result<(), FatalError> {
    let now_ms = chrono::Utc::now().timestamp_millis();
    for group in groups.list_all().await? {
        match cascade_action(&group, now_ms) {
            Some(Cascade::Enable) => {
                groups.set_fields(group.id, doc! { "disabled": false }).await?;
                for peer_id in &group.peer_ids {
                    peers.set_fields(peer_id, doc! { "allowedUsage": group.allowed_usage }).await?;
                }
            },
            Some(Cascade::Disable) => {
                groups.set_fields(group.id, doc! { "disabled": true }).await?;
                for peer_id in &group.peer_ids {
                    peers.set_fields(peer_id, doc! { "allowedUsage": 0_i64 }).await?;
                }
            },
            None => {},
        }
    }
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum Cascade {
    Enable,
    Disable,
}

/// Pure decision function: a disabled-but-now-within-quota group
/// re-enables and pushes its quota back down to members; an
/// enabled-but-now-over-quota-or-expired group disables and zeroes
/// members' quota. Mirrors the two `if`/`else if` branches in the
/// original's group loop exactly, including that a group already in
/// the target state is left untouched.
fn cascade_action(group: &Group, now_ms: i64) -> Option<Cascade> {
    let over = group.over_quota_or_expired(now_ms);
    if group.disabled && !over {
        Some(Cascade::Enable)
    } else if !group.disabled && over {
        Some(Cascade::Disable)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::oid::ObjectId;

    fn group() -> Group {
        Group {
            id: ObjectId::new(),
            name: "g".into(),
            owner_id: "owner".into(),
            peer_ids: vec!["p1".into(), "p2".into()],
            allowed_usage: 5000,
            expires_at: 0,
            total_tx: 0,
            total_rx: 0,
            disabled: false,
        }
    }

    #[test]
    fn disables_over_quota_group() {
        let mut g = group();
        g.total_tx = 5000;
        assert_eq!(cascade_action(&g, 0), Some(Cascade::Disable));
    }

    #[test]
    fn re_enables_group_back_under_quota() {
        let mut g = group();
        g.disabled = true;
        g.allowed_usage = 5000;
        g.total_tx = 100;
        assert_eq!(cascade_action(&g, 0), Some(Cascade::Enable));
    }

    #[test]
    fn leaves_already_converged_group_alone() {
        let g = group();
        assert_eq!(cascade_action(&g, 0), None);
    }

    #[test]
    fn disables_expired_group() {
        let mut g = group();
        g.expires_at = 100;
        assert_eq!(cascade_action(&g, 200), Some(Cascade::Disable));
    }

    #[test]
    fn zero_allowed_usage_keeps_group_disabled() {
        let mut g = group();
        g.allowed_usage = 0;
        assert_eq!(cascade_action(&g, 0), Some(Cascade::Disable));
    }
}
