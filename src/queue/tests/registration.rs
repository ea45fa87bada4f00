use super::*;

#[tokio::test]
async fn test_add_without_start_stays_pending() {
    let queue = create_test_queue(2);
    let (task, operation, _gate) = gated_task("idle");

    let id = queue.add_task(task, false).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    assert_eq!(status_of(&queue, id).await, Status::Pending);
    assert_eq!(operation.runs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_add_with_start_runs_immediately() {
    let queue = create_test_queue(2);
    let (task, operation, _gate) = gated_task("upload");

    let id = queue.add_task(task, true).await.unwrap();

    let info = wait_for_status(&queue, id, Status::Running).await;
    assert!(info.started_at.is_some());
    assert!(info.ended_at.is_none());
    assert_eq!(operation.runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_list_is_in_insertion_order() {
    let queue = create_test_queue(1);
    let mut ids = Vec::new();
    for name in ["first", "second", "third"] {
        let (task, _, _gate) = gated_task(name);
        ids.push(queue.add_task(task, false).await.unwrap());
    }

    let listed: Vec<_> = queue.list().await.into_iter().map(|t| t.id).collect();
    assert_eq!(listed, ids);
    assert_eq!(queue.counts().await.pending, 3);
}

#[tokio::test]
async fn test_get_unknown_returns_not_found() {
    let queue = create_test_queue(1);

    let err = queue.get(crate::types::TaskId(u64::MAX)).await.unwrap_err();
    assert!(matches!(err, Error::Task(TaskError::NotFound { .. })));
}

#[tokio::test]
async fn test_add_after_shutdown_is_rejected() {
    let queue = create_test_queue(1);
    queue.shutdown().await;

    let (task, _, _gate) = gated_task("late");
    let err = queue.add_task(task, true).await.unwrap_err();
    assert!(matches!(err, Error::ShuttingDown));
    assert!(!queue.is_accepting());
}

#[tokio::test]
async fn test_parent_with_unregistered_child_is_rejected() {
    let queue = create_test_queue(1);
    let mut parent = Task::group("submit", TaskKind::Submit, None);
    let (child, _, _gate) = gated_task("part");
    let child = child.child_of(&mut parent);

    let err = queue.add_task(parent, true).await.unwrap_err();
    assert!(
        matches!(err, Error::Task(TaskError::NotFound { id }) if id == child.id()),
        "expected NotFound for the missing child, got {err:?}"
    );
}

#[tokio::test]
async fn test_child_registered_before_parent_is_adopted() {
    let queue = create_test_queue(2);
    let parent = Task::group("submit", TaskKind::Submit, None);
    let (child, _, gate) = gated_task("part");
    let child = child.with_parent(parent.id());

    let child_id = queue.add_task(child, false).await.unwrap();
    let parent_id = queue.add_task(parent, true).await.unwrap();

    assert_eq!(queue.get(parent_id).await.unwrap().children, vec![child_id]);
    wait_for_status(&queue, child_id, Status::Running).await;
    gate.complete(json!("done"));
    let info = wait_for_status(&queue, parent_id, Status::Completed).await;
    assert_eq!(info.output, Some(json!(["done"])));
}

#[tokio::test]
async fn test_child_added_after_pending_parent_is_appended() {
    let queue = create_test_queue(2);
    let parent = Task::group("edit", TaskKind::Edit, None);
    let parent_id = queue.add_task(parent, false).await.unwrap();

    let (child, _, _gate) = gated_task("part");
    let child_id = queue
        .add_task(child.with_parent(parent_id), false)
        .await
        .unwrap();

    assert_eq!(queue.get(parent_id).await.unwrap().children, vec![child_id]);
    assert_eq!(status_of(&queue, child_id).await, Status::Pending);
}

#[tokio::test]
async fn test_attach_to_running_parent_returns_invalid_transition() {
    let queue = create_test_queue(2);
    let mut parent = Task::group("submit", TaskKind::Submit, None);
    let (first, _, _gate) = gated_task("part 1");
    let first = first.child_of(&mut parent);
    queue.add_task(first, false).await.unwrap();
    let parent_id = queue.add_task(parent, true).await.unwrap();
    wait_for_status(&queue, parent_id, Status::Running).await;

    let (late, _, _late_gate) = gated_task("part 2");
    let err = queue
        .add_task(late.with_parent(parent_id), false)
        .await
        .unwrap_err();

    assert!(
        matches!(
            err,
            Error::Task(TaskError::InvalidTransition { id, current: Status::Running, .. }) if id == parent_id
        ),
        "expected InvalidTransition on the parent, got {err:?}"
    );
    assert_eq!(queue.get(parent_id).await.unwrap().children.len(), 1);
}

#[tokio::test]
async fn test_child_of_leaf_returns_invalid_graph() {
    let queue = create_test_queue(1);
    let (leaf, _, _gate) = gated_task("upload");
    let leaf_id = queue.add_task(leaf, false).await.unwrap();

    let (child, _, _child_gate) = gated_task("part");
    let child_id = child.id();
    let err = queue
        .add_task(child.with_parent(leaf_id), false)
        .await
        .unwrap_err();

    assert!(
        matches!(err, Error::Task(TaskError::InvalidGraph { id, .. }) if id == child_id),
        "expected InvalidGraph, got {err:?}"
    );
    assert_eq!(err.code(), "invalid_graph");
    assert_eq!(queue.list().await.len(), 1);
}
