mod common;

use common::TestEnv;
use taskbridge::bridge::ProjectBridge;
use taskbridge::db::models::AnyTask;
use taskbridge::error::BridgeError;
use taskbridge::ids::{classify, IdSpace};
use taskbridge::organizations::OrganizationManager;
use taskbridge::resolver::StoreTarget;
use taskbridge::routing::{Collection, RequestContext};
use taskbridge::store::{ColumnManager, MirrorManager, NewTask, PersonalTaskManager, TaskManager};

fn titled(title: &str) -> NewTask {
    NewTask {
        title: title.to_string(),
        ..NewTask::default()
    }
}

#[tokio::test]
async fn test_org_project_lands_in_org_store() {
    let env = TestEnv::new().await;
    let org = env.org("acme", Some(&env.org_db_url("acme"))).await;
    let user = env.user("dev@acme.test", Some(&org.id)).await;
    let project = env.mirrored_project("Launch", Some(&org.id), &user.id).await;

    let store_id = project.custom_db_project_id.clone().unwrap();
    assert_eq!(classify(&project.id).unwrap(), IdSpace::Metadata);
    assert_eq!(classify(&store_id).unwrap(), IdSpace::Store);

    let route = env
        .resolver
        .resolve_task_store(&RequestContext::for_project(&project.id))
        .await
        .unwrap();
    assert_eq!(route.target, StoreTarget::Organization(org.id.clone()));
    assert_eq!(route.collection, Collection::Tasks);

    // The mirror is in the org store and nowhere else
    let mirror = MirrorManager::new(&route.store.pool)
        .get_mirror(&store_id)
        .await
        .unwrap();
    assert_eq!(mirror.meta_project_id, project.id);

    let admin = env.resolver.open_strict(&StoreTarget::Admin).await.unwrap();
    assert!(MirrorManager::new(&admin.pool)
        .find_mirror(&store_id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_store_id_routes_like_meta_id() {
    let env = TestEnv::new().await;
    let org = env.org("acme", Some(&env.org_db_url("acme"))).await;
    let user = env.user("dev@acme.test", Some(&org.id)).await;
    let project = env.mirrored_project("Launch", Some(&org.id), &user.id).await;
    let store_id = project.custom_db_project_id.clone().unwrap();

    let by_meta = env
        .resolver
        .resolve_task_store(&RequestContext::for_project(&project.id))
        .await
        .unwrap();
    let by_store = env
        .resolver
        .resolve_task_store(&RequestContext::for_project(&store_id))
        .await
        .unwrap();

    assert_eq!(by_meta.target, by_store.target);
    assert_eq!(by_meta.project, by_store.project);
}

#[tokio::test]
async fn test_orgless_project_lives_with_owner() {
    let env = TestEnv::new().await;
    let user = env.user("solo@example.com", None).await;
    let project = env.mirrored_project("Garden", None, &user.id).await;

    let route = env
        .resolver
        .resolve_task_store(&RequestContext::for_project(&project.id))
        .await
        .unwrap();
    assert_eq!(route.target, StoreTarget::User(user.id.clone()));
    assert!(env.resolver.config().user_db_path(&user.id).exists());
}

#[tokio::test]
async fn test_shared_org_project_lands_in_admin_store() {
    let env = TestEnv::new().await;
    let org = env.org("shared", None).await;
    let user = env.user("m@shared.test", Some(&org.id)).await;
    let project = env.mirrored_project("Ops", Some(&org.id), &user.id).await;

    let route = env
        .resolver
        .resolve_task_store(&RequestContext::for_project(&project.id))
        .await
        .unwrap();
    assert_eq!(route.target, StoreTarget::Admin);
    assert!(MirrorManager::new(&route.store.pool)
        .find_by_meta_id(&project.id)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_pending_mirror_is_reported() {
    let env = TestEnv::new().await;
    let user = env.user("solo@example.com", None).await;
    let created = taskbridge::projects::ProjectManager::new(env.resolver.meta())
        .create_project("Later", None, None, &user.id)
        .await
        .unwrap();

    let route = env
        .resolver
        .resolve_task_store(&RequestContext::for_project(&created.project.id))
        .await
        .unwrap();
    let project = route.project.unwrap();
    assert!(matches!(
        project.require_store_id(),
        Err(BridgeError::MirrorPending(_))
    ));
}

#[tokio::test]
async fn test_locate_task_across_stores() {
    let env = TestEnv::new().await;
    let org = env.org("acme", Some(&env.org_db_url("acme"))).await;
    let member = env.user("dev@acme.test", Some(&org.id)).await;
    let solo = env.user("solo@example.com", None).await;
    let project = env.mirrored_project("Launch", Some(&org.id), &member.id).await;

    let org_route = env
        .resolver
        .resolve_task_store(&RequestContext::for_project(&project.id))
        .await
        .unwrap();
    let task = TaskManager::new(&org_route.store.pool)
        .add_task(
            project.custom_db_project_id.as_deref().unwrap(),
            titled("Ship it"),
        )
        .await
        .unwrap();

    let solo_route = env
        .resolver
        .resolve_task_store(&RequestContext::for_user(&solo.id))
        .await
        .unwrap();
    assert_eq!(solo_route.collection, Collection::PersonalTasks);
    let personal = PersonalTaskManager::new(&solo_route.store.pool)
        .add_personal_task(&solo.id, "Water plants", None, None, None)
        .await
        .unwrap();

    // Project task: found through the project hint and through the member
    for ctx in [
        RequestContext::for_project(&project.id),
        RequestContext::for_user(&member.id),
    ] {
        let located = env.resolver.locate_task(&task.id, &ctx).await.unwrap();
        assert_eq!(located.route.target, StoreTarget::Organization(org.id.clone()));
        assert_eq!(located.route.collection, Collection::Tasks);
        assert_eq!(
            located.route.project.as_ref().map(|p| p.meta_id.as_str()),
            Some(project.id.as_str())
        );
        assert!(matches!(located.task, AnyTask::Project(_)));
    }

    // Personal task: only reachable through its owner
    let located = env
        .resolver
        .locate_task(&personal.id, &RequestContext::for_user(&solo.id))
        .await
        .unwrap();
    assert_eq!(located.route.collection, Collection::PersonalTasks);
    assert_eq!(located.task.id(), personal.id);

    let missing = env
        .resolver
        .locate_task(&personal.id, &RequestContext::default())
        .await;
    assert!(matches!(missing, Err(BridgeError::TaskNotFound(_))));
}

#[tokio::test]
async fn test_locate_skips_unavailable_store() {
    let env = TestEnv::new().await;
    let down = env.org("down", Some(&env.broken_db_url("down"))).await;
    let admin = env.resolver.open_strict(&StoreTarget::Admin).await.unwrap();
    let personal = PersonalTaskManager::new(&admin.pool)
        .add_personal_task("someone000000000001", "In admin", None, None, None)
        .await
        .unwrap();

    let located = env
        .resolver
        .locate_task(
            &personal.id,
            &RequestContext {
                organization_id: Some(down.id),
                ..RequestContext::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(located.route.target, StoreTarget::Admin);
    assert_eq!(located.route.store.target, StoreTarget::Admin);
    assert!(!located.route.degraded);
}

#[tokio::test]
async fn test_degraded_route_reads_admin() {
    let env = TestEnv::new().await;
    let down = env.org("down", Some(&env.broken_db_url("down"))).await;
    let user = env.user("m@down.test", Some(&down.id)).await;

    let route = env
        .resolver
        .resolve_task_store(&RequestContext::for_user(&user.id))
        .await
        .unwrap();
    assert!(route.degraded);
    assert_eq!(route.target, StoreTarget::Organization(down.id));
    assert_eq!(route.store.target, StoreTarget::Admin);
}

#[tokio::test]
async fn test_no_fallback_when_disabled() {
    let env = TestEnv::with_config(|c| c.admin_fallback = false).await;
    let down = env.org("down", Some(&env.broken_db_url("down"))).await;

    let result = env
        .resolver
        .resolve_task_store(&RequestContext {
            organization_id: Some(down.id),
            ..RequestContext::default()
        })
        .await;
    assert!(matches!(result, Err(BridgeError::StoreUnavailable { .. })));
}

#[tokio::test]
async fn test_moved_org_store_is_reopened() {
    let env = TestEnv::new().await;
    let org = env.org("acme", Some(&env.org_db_url("acme-v1"))).await;
    let ctx = RequestContext {
        organization_id: Some(org.id.clone()),
        ..RequestContext::default()
    };

    let before = env.resolver.resolve_task_store(&ctx).await.unwrap();
    PersonalTaskManager::new(&before.store.pool)
        .add_personal_task("someone000000000001", "Old home", None, None, None)
        .await
        .unwrap();

    OrganizationManager::new(env.resolver.meta())
        .set_database_url(&org.id, Some(&env.org_db_url("acme-v2")))
        .await
        .unwrap();

    let after = env.resolver.resolve_task_store(&ctx).await.unwrap();
    assert!(PersonalTaskManager::new(&after.store.pool)
        .list_personal_tasks("someone000000000001")
        .await
        .unwrap()
        .is_empty());
    assert!(env.dir.path().join("orgs").join("acme-v2.db").exists());
}

#[tokio::test]
async fn test_board_columns_follow_project() {
    let env = TestEnv::new().await;
    let user = env.user("solo@example.com", None).await;
    let project = env.mirrored_project("Board", None, &user.id).await;

    let r = ProjectBridge::new(env.resolver.meta())
        .resolve(&project.id)
        .await
        .unwrap();
    let route = env
        .resolver
        .resolve_task_store(&RequestContext::for_project(&project.id))
        .await
        .unwrap();
    let columns = ColumnManager::new(&route.store.pool)
        .list_columns(r.require_store_id().unwrap())
        .await
        .unwrap();
    let names: Vec<_> = columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["To Do", "In Progress", "Done"]);
}
