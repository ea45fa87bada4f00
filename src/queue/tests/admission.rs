use super::*;

#[tokio::test]
async fn test_budget_of_two_admits_third_child_after_first_finishes() {
    let queue = create_test_queue(2);
    let mut parent = Task::group("submit", TaskKind::Submit, None);

    let mut children = Vec::new();
    for name in ["part 1", "part 2", "part 3"] {
        let (task, operation, gate) = gated_task(name);
        let task = task.child_of(&mut parent);
        let id = queue.add_task(task, false).await.unwrap();
        children.push((id, operation, gate));
    }
    let parent_id = queue.add_task(parent, true).await.unwrap();

    wait_for_status(&queue, parent_id, Status::Running).await;
    wait_for_status(&queue, children[0].0, Status::Running).await;
    wait_for_status(&queue, children[1].0, Status::Running).await;
    assert_eq!(status_of(&queue, children[2].0).await, Status::Pending);
    assert_eq!(children[2].1.runs.load(Ordering::SeqCst), 0);

    let (first_id, _, first_gate) = children.remove(0);
    first_gate.complete(json!({"cid": 1}));
    wait_for_status(&queue, first_id, Status::Completed).await;

    let third = &children[1];
    wait_for_status(&queue, third.0, Status::Running).await;
    assert_eq!(third.1.runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_top_level_tasks_are_admitted_fifo() {
    let queue = create_test_queue(1);
    let (first, _, first_gate) = gated_task("first");
    let (second, _, second_gate) = gated_task("second");
    let (third, third_op, _third_gate) = gated_task("third");

    let first = queue.add_task(first, true).await.unwrap();
    let second = queue.add_task(second, true).await.unwrap();
    let third = queue.add_task(third, true).await.unwrap();

    wait_for_status(&queue, first, Status::Running).await;
    assert_eq!(status_of(&queue, second).await, Status::Pending);
    assert_eq!(status_of(&queue, third).await, Status::Pending);

    first_gate.complete(json!(null));
    wait_for_status(&queue, second, Status::Running).await;
    assert_eq!(status_of(&queue, third).await, Status::Pending);
    assert_eq!(third_op.runs.load(Ordering::SeqCst), 0);

    second_gate.fail("network down");
    wait_for_status(&queue, second, Status::Error).await;
    wait_for_status(&queue, third, Status::Running).await;
}

#[tokio::test]
async fn test_failed_operation_records_error() {
    let queue = create_test_queue(1);
    let (task, _, gate) = gated_task("upload");
    let id = queue.add_task(task, true).await.unwrap();

    wait_for_status(&queue, id, Status::Running).await;
    gate.fail("403 forbidden");

    let info = wait_for_status(&queue, id, Status::Error).await;
    assert!(info.error.unwrap().contains("403 forbidden"));
    assert!(info.ended_at.is_some());
    assert!(info.output.is_none());
}

#[tokio::test]
async fn test_interrupt_frees_slot_for_next_task() {
    let queue = create_test_queue(1);
    let (first, first_op, _first_gate) = gated_task("first");
    let (second, _, _second_gate) = gated_task("second");

    let first = queue.add_task(first, true).await.unwrap();
    let second = queue.add_task(second, true).await.unwrap();
    wait_for_status(&queue, first, Status::Running).await;

    queue.interrupt(first).await.unwrap();

    wait_for_status(&queue, second, Status::Running).await;
    assert_eq!(first_op.cancels.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_explicit_start_admits_pending_task() {
    let queue = create_test_queue(1);
    let (task, operation, gate) = gated_task("manual");
    let id = queue.add_task(task, false).await.unwrap();

    queue.start(id).await.unwrap();
    wait_for_status(&queue, id, Status::Running).await;
    gate.complete(json!(7));

    let info = wait_for_status(&queue, id, Status::Completed).await;
    assert_eq!(info.output, Some(json!(7)));
    assert_eq!(operation.runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_start_on_running_task_returns_invalid_transition() {
    let queue = create_test_queue(1);
    let (task, _, _gate) = gated_task("busy");
    let id = queue.add_task(task, true).await.unwrap();
    wait_for_status(&queue, id, Status::Running).await;

    let err = queue.start(id).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Task(TaskError::InvalidTransition {
            current: Status::Running,
            ..
        })
    ));
}

#[tokio::test]
async fn test_completion_hook_runs_with_output() {
    let queue = create_test_queue(1);
    let hook = Arc::new(RecordingHook::default());
    let task = Task::new(
        "submit",
        TaskKind::Submit,
        Arc::new(InstantOperation(Ok(json!({"aid": 170001})))),
    )
    .with_hook(hook.clone());

    let id = queue.add_task(task, true).await.unwrap();
    wait_for_status(&queue, id, Status::Completed).await;

    tokio::time::timeout(std::time::Duration::from_secs(1), async {
        while hook.calls.lock().unwrap().is_empty() {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("hook should run");
    let calls = hook.calls.lock().unwrap();
    assert_eq!(calls.as_slice(), &[(id, json!({"aid": 170001}))]);
}

#[tokio::test]
async fn test_failing_hook_leaves_task_completed() {
    let queue = create_test_queue(1);
    let hook = Arc::new(RecordingHook {
        fail: true,
        ..RecordingHook::default()
    });
    let task = Task::new(
        "submit",
        TaskKind::Submit,
        Arc::new(InstantOperation(Ok(json!(1)))),
    )
    .with_hook(hook);
    let (next, _, _gate) = gated_task("next");

    let id = queue.add_task(task, true).await.unwrap();
    let next = queue.add_task(next, true).await.unwrap();

    wait_for_status(&queue, id, Status::Completed).await;
    // Admission carries on after the hook
    wait_for_status(&queue, next, Status::Running).await;
    assert_eq!(status_of(&queue, id).await, Status::Completed);
}

#[tokio::test]
async fn test_panicking_operation_fails_task_and_frees_slot() {
    let queue = create_test_queue(1);
    let mut errors = queue.subscribe_to(EventFilter::kind(EventKind::Error));

    let task = Task::new("crashes", TaskKind::UploadPart, Arc::new(PanickingOperation));
    let crashing = queue.add_task(task, true).await.unwrap();
    let (next, _operation, gate) = gated_task("next");
    let next = queue.add_task(next, true).await.unwrap();

    let info = wait_for_status(&queue, crashing, Status::Error).await;
    let message = info.error.unwrap();
    assert!(message.contains("operation panicked"), "{message}");

    let event = errors.recv().await.unwrap();
    assert_eq!(event.task_id(), crashing);

    wait_for_status(&queue, next, Status::Running).await;
    gate.complete(json!("done"));
    wait_for_status(&queue, next, Status::Completed).await;
}
