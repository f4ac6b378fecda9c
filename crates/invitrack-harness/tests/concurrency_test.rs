//! Concurrency tests.
//!
//! Events for different communities must proceed in parallel; events for the
//! same community must be serialized so no usage delta is consumed twice.
//! Virtual elapsed time tells the two apart: parallel handlers overlap their
//! platform delays, serialized handlers add them up.

use std::{sync::Arc, time::Duration};

use invitrack_core::{CommunityId, MemberId};
use invitrack_harness::{SimEnv, SimPlatform};
use invitrack_server::{Engine, EngineConfig, EventOutcome, MemberEvent, MemoryStorage, Storage};
use tokio::{task::JoinSet, time::Instant};

const FETCH_DELAY: Duration = Duration::from_secs(5);
const DEBOUNCE: Duration = Duration::from_secs(2);

type SimEngine = Engine<SimEnv, MemoryStorage, SimPlatform>;

fn engine(platform: &SimPlatform) -> Arc<SimEngine> {
    Arc::new(Engine::new(
        SimEnv::new(),
        MemoryStorage::new(),
        platform.clone(),
        EngineConfig { debounce_delay: DEBOUNCE, ..EngineConfig::default() },
    ))
}

fn joined(community: CommunityId, member: u64) -> MemberEvent {
    MemberEvent::Joined { community, member: MemberId(member) }
}

/// Communities with invite "A" (member 1) and "B" (member 2), warmed.
async fn setup(communities: &[CommunityId]) -> (SimPlatform, Arc<SimEngine>) {
    let platform = SimPlatform::new();
    for &community in communities {
        platform.create_invite(community, "A", MemberId(1), 0);
        platform.create_invite(community, "B", MemberId(2), 0);
    }
    let engine = engine(&platform);
    for &community in communities {
        engine.initialize_community(community).await.unwrap();
    }
    platform.set_fetch_delay(FETCH_DELAY);
    (platform, engine)
}

#[tokio::test(start_paused = true)]
async fn different_communities_run_in_parallel() {
    let (north, south) = (CommunityId(1), CommunityId(2));
    let (platform, engine) = setup(&[north, south]).await;

    platform.join_via(north, MemberId(10), "A");
    platform.join_via(south, MemberId(20), "A");

    let start = Instant::now();
    let (a, b) =
        tokio::join!(engine.handle_event(joined(north, 10)), engine.handle_event(joined(south, 20)));

    assert!(matches!(a.unwrap(), EventOutcome::Attributed { count: 1, .. }));
    assert!(matches!(b.unwrap(), EventOutcome::Attributed { count: 1, .. }));
    assert_eq!(start.elapsed(), DEBOUNCE + FETCH_DELAY);
}

#[tokio::test(start_paused = true)]
async fn same_community_is_serialized() {
    let guild = CommunityId(1);
    let (platform, engine) = setup(&[guild]).await;

    platform.join_via(guild, MemberId(10), "A");
    platform.join_via(guild, MemberId(11), "B");

    let start = Instant::now();
    let (a, b) =
        tokio::join!(engine.handle_event(joined(guild, 10)), engine.handle_event(joined(guild, 11)));
    let outcomes = [a.unwrap(), b.unwrap()];

    // Both deltas were visible to whichever handler ran first; it consumed
    // one, the other handler saw none left.
    let attributed =
        outcomes.iter().filter(|o| matches!(o, EventOutcome::Attributed { .. })).count();
    assert_eq!(attributed, 1);
    assert!(outcomes.contains(&EventOutcome::NotAttributable));
    assert_eq!(engine.storage().list_attributions(guild).unwrap().len(), 1);
    assert_eq!(start.elapsed(), DEBOUNCE + FETCH_DELAY * 2);
}

#[tokio::test(start_paused = true)]
async fn concurrent_duplicates_count_once() {
    let guild = CommunityId(1);
    let (platform, engine) = setup(&[guild]).await;

    platform.join_via(guild, MemberId(10), "A");

    let (a, b) =
        tokio::join!(engine.handle_event(joined(guild, 10)), engine.handle_event(joined(guild, 10)));
    let mut outcomes = vec![a.unwrap(), b.unwrap()];
    outcomes.sort_by_key(|o| matches!(o, EventOutcome::DuplicateJoin { .. }));

    assert!(matches!(outcomes[0], EventOutcome::Attributed { count: 1, .. }));
    assert_eq!(outcomes[1], EventOutcome::DuplicateJoin { inviter: MemberId(1), count: 1 });
    assert_eq!(engine.invite_count(guild, MemberId(1)).unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn leave_waits_for_in_flight_join() {
    let guild = CommunityId(1);
    let (platform, engine) = setup(&[guild]).await;

    platform.join_via(guild, MemberId(10), "A");

    // The leave arrives while the join is fetching; it must see the record
    let leave = async {
        tokio::time::sleep(DEBOUNCE + Duration::from_secs(1)).await;
        platform.remove_member(guild, MemberId(10));
        engine.handle_event(MemberEvent::Left { community: guild, member: MemberId(10) }).await
    };
    let (join, leave) = tokio::join!(engine.handle_event(joined(guild, 10)), leave);

    assert!(matches!(join.unwrap(), EventOutcome::Attributed { count: 1, .. }));
    assert!(matches!(leave.unwrap(), EventOutcome::Departed { count: 0, .. }));
    assert_eq!(engine.invite_count(guild, MemberId(1)).unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn leave_during_debounce_waits_for_join() {
    let guild = CommunityId(1);
    let (platform, engine) = setup(&[guild]).await;

    platform.join_via(guild, MemberId(10), "A");

    // The leave arrives before the join's debounce has elapsed
    let leave = async {
        tokio::time::sleep(DEBOUNCE / 2).await;
        platform.remove_member(guild, MemberId(10));
        engine.handle_event(MemberEvent::Left { community: guild, member: MemberId(10) }).await
    };
    let (join, leave) = tokio::join!(engine.handle_event(joined(guild, 10)), leave);

    assert!(matches!(join.unwrap(), EventOutcome::Attributed { count: 1, .. }));
    assert!(matches!(leave.unwrap(), EventOutcome::Departed { count: 0, .. }));
    assert!(engine.storage().load_attribution(guild, MemberId(10)).unwrap().is_none());
    assert_eq!(engine.invite_count(guild, MemberId(1)).unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn many_communities_in_spawned_tasks() {
    let communities: Vec<CommunityId> = (1..=8).map(CommunityId).collect();
    let (platform, engine) = setup(&communities).await;

    let start = Instant::now();
    let mut tasks = JoinSet::new();
    for &community in &communities {
        let platform = platform.clone();
        let engine = Arc::clone(&engine);
        tasks.spawn(async move {
            for member in 0..5 {
                platform.join_via(community, MemberId(100 + member), "A");
                engine.handle_event(joined(community, 100 + member)).await.unwrap();
            }
        });
    }
    while let Some(result) = tasks.join_next().await {
        result.unwrap();
    }

    for community in communities {
        assert_eq!(engine.invite_count(community, MemberId(1)).unwrap(), 5);
    }
    // Five sequential joins per community, all communities overlapping
    assert_eq!(start.elapsed(), (DEBOUNCE + FETCH_DELAY) * 5);
}
