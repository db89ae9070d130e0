use marking_pool::coordination::RecordedEvent;
use marking_pool::models::rubric::{cycle_letter, grade_letter};
use marking_pool::{
    AdvancePolicy, Config, DelayRange, Event, ExitReason, GradingError, GradingResult, GradingSession,
    MemoryExamSource, MemoryRubricStore, RaceArtifact, RubricStore, RunReport, SyncMode,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// 零延迟、记录事件的测试配置
fn fast_config(workers: usize, mode: SyncMode) -> Config {
    Config {
        worker_count: workers,
        sync_mode: mode,
        rubric_lines: 5,
        rubric_change_probability: 0.0,
        review_delay: DelayRange::ZERO,
        marking_delay: DelayRange::ZERO,
        poll_interval_ms: 1,
        record_events: true,
        seed: Some(7),
        ..Default::default()
    }
}

fn two_line_store() -> Arc<MemoryRubricStore> {
    Arc::new(MemoryRubricStore::new(vec!["1, A".to_string(), "2, B".to_string()]))
}

fn sentinel_exams() -> Arc<MemoryExamSource> {
    Arc::new(
        MemoryExamSource::new()
            .with_exam("exam1.txt", &["1001", "Q1 4", "Q2 x=2"])
            .with_exam("exam2.txt", &["1002", "Q1 5"])
            .with_exam("exam3.txt", &["9999"]),
    )
}

async fn run_session(
    config: Config,
    store: Arc<MemoryRubricStore>,
    source: Arc<MemoryExamSource>,
) -> Result<RunReport, GradingError> {
    let session = GradingSession::initialize(config, store, source).await?;
    session.run().await
}

fn count(report: &RunReport, predicate: impl Fn(&Event) -> bool) -> usize {
    report.events_matching(predicate).len()
}

#[tokio::test]
async fn test_end_to_end_stops_at_sentinel() {
    let store = two_line_store();
    let source = sentinel_exams();

    let report = run_session(fast_config(3, SyncMode::Guarded), store, Arc::clone(&source))
        .await
        .expect("阅卷应该成功结束");

    assert_eq!(report.exam_index, 2);
    assert_eq!(report.generation, 3);
    assert!(report.terminated);
    assert_eq!(report.exams_loaded, 3);
    assert_eq!(report.rubric, vec!["1, A", "2, B", "3, C", "4, D", "5, E"]);
    assert_eq!(source.fetched(), vec!["exam1.txt", "exam2.txt", "exam3.txt"]);
    assert_eq!(report.workers.len(), 3);
    assert!(!report.has_race_artifacts());

    // 终止信号只发出一次
    assert_eq!(count(&report, |e| matches!(e, Event::TerminationRaised { .. })), 1);
    assert_eq!(count(&report, |e| matches!(e, Event::WorkerExited { .. })), 3);

    // 哨兵加载之后，其余阅卷员最多再进入一次屏障等待就退出
    let sentinel_seq = report
        .events
        .iter()
        .find(|e| matches!(&e.event, Event::ExamLoaded { student, .. } if student == "9999"))
        .map(|e| e.seq)
        .expect("应记录哨兵试卷的加载");
    for worker in 2..=3 {
        let exited = report
            .events
            .iter()
            .find(|e| matches!(e.event, Event::WorkerExited { worker: w, .. } if w == worker))
            .unwrap();
        assert!(exited.seq > sentinel_seq, "[TA {}] 在哨兵加载前退出", worker);
        assert_eq!(exited.event, Event::WorkerExited { worker, reason: ExitReason::Terminated });

        let waits_after = report
            .events
            .iter()
            .filter(|e| e.seq > sentinel_seq)
            .filter(|e| matches!(e.event, Event::BarrierWait { worker: w, .. } if w == worker))
            .count();
        assert!(waits_after <= 1, "[TA {}] 哨兵之后等待了 {} 次", worker, waits_after);
    }
    assert!(report.events_matching(|e| matches!(e, Event::BarrierReleased { .. })).iter().all(
        |e| matches!(e, Event::BarrierReleased { generation, .. } if *generation <= 3)
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_end_to_end_stops_at_sentinel_multi_thread() {
    let mut config = fast_config(3, SyncMode::Guarded);
    config.marking_delay = DelayRange::new(0, 2);
    config.rubric_change_probability = 0.2;

    let report = run_session(config, two_line_store(), sentinel_exams())
        .await
        .unwrap();

    assert_eq!(report.exam_index, 2);
    assert_eq!(report.generation, 3);
    assert!(report.terminated);
    assert_eq!(report.rubric.len(), 5);
}

#[tokio::test]
async fn test_single_exam_exhausts_without_extra_fetch() {
    let source = Arc::new(MemoryExamSource::new().with_exam("only.txt", &["1234"]));

    let report = run_session(fast_config(3, SyncMode::Guarded), two_line_store(), Arc::clone(&source))
        .await
        .unwrap();

    assert!(report.terminated);
    assert_eq!(report.exam_index, 0);
    assert_eq!(report.generation, 1);
    assert_eq!(report.marks_claimed, 5);
    assert_eq!(source.fetched(), vec!["only.txt"]);

    let coordinator = report.workers.iter().find(|w| w.worker == 1).unwrap();
    assert_eq!(coordinator.exit, Some(ExitReason::ExamsExhausted));
    assert!(report
        .workers
        .iter()
        .filter(|w| w.worker != 1)
        .all(|w| w.exit == Some(ExitReason::Terminated)));
}

#[tokio::test]
async fn test_sentinel_as_first_exam_stops_everyone() {
    let source = Arc::new(MemoryExamSource::new().with_exam("stop.txt", &["9999"]).with_exam("never.txt", &["1"]));

    let report = run_session(fast_config(4, SyncMode::Guarded), two_line_store(), Arc::clone(&source))
        .await
        .unwrap();

    assert!(report.terminated);
    assert_eq!(report.generation, 1);
    assert_eq!(report.marks_claimed, 0);
    assert_eq!(source.fetched(), vec!["stop.txt"]);
}

/// 受保护模式：每份试卷恰好 R 次批改，剩余题数依次递减到 0，代数逐一递增
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_guarded_marks_each_exam_exactly_once() {
    let mut source = MemoryExamSource::new();
    for i in 0..5 {
        let student = (2000 + i).to_string();
        source = source.with_exam(format!("exam{}.txt", i), &[student.as_str()]);
    }
    let mut config = fast_config(4, SyncMode::Guarded);
    config.marking_delay = DelayRange::new(0, 2);

    let report = run_session(config, two_line_store(), Arc::new(source)).await.unwrap();

    assert_eq!(report.exam_index, 4);
    assert_eq!(report.generation, 5);
    assert_eq!(report.marks_claimed, 25);
    assert_eq!(report.questions_remaining, 0);
    assert!(!report.has_race_artifacts());

    let loads: Vec<(usize, u64)> = report
        .events
        .iter()
        .filter_map(|e| match &e.event {
            Event::ExamLoaded { index, generation, .. } => Some((*index, *generation)),
            _ => None,
        })
        .collect();
    assert_eq!(loads, vec![(0, 1), (1, 2), (2, 3), (3, 4), (4, 5)]);

    let mut claims: BTreeMap<u64, Vec<i64>> = BTreeMap::new();
    for e in &report.events {
        if let Event::MarkClaimed { generation, remaining, .. } = &e.event {
            claims.entry(*generation).or_default().push(*remaining);
        }
    }
    assert_eq!(claims.len(), 5);
    for (generation, remaining) in claims {
        assert_eq!(remaining, vec![4, 3, 2, 1, 0], "gen {} 的剩余题数序列异常", generation);
    }

    // 批改记录归属于抢占时的试卷
    let mut recorded = 0;
    for e in &report.events {
        if let Event::MarkRecorded { student, generation, .. } = &e.event {
            assert_eq!(*student, (2000 + generation - 1).to_string());
            recorded += 1;
        }
    }
    assert_eq!(recorded, 25);
}

/// 受保护模式：最终评分标准等于各次修改依次作用的结果
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_guarded_rubric_is_sequential_composition() {
    let mut config = fast_config(3, SyncMode::Guarded);
    config.rubric_change_probability = 1.0;
    config.review_delay = DelayRange::new(0, 1);
    let store = two_line_store();

    let report = run_session(config, Arc::clone(&store), sentinel_exams()).await.unwrap();

    let initial = ['A', 'B', 'C', 'D', 'E'];
    for (line, start) in initial.iter().enumerate() {
        let writes: Vec<&RecordedEvent> = report
            .events
            .iter()
            .filter(|e| matches!(e.event, Event::RubricWritten { line: l, .. } if l == line))
            .collect();

        // 每次修改都以上一次的结果为起点
        let mut expected = *start;
        for w in &writes {
            if let Event::RubricWritten { from, to, .. } = w.event {
                assert_eq!(from, expected, "rubric[{}] 出现丢失更新", line);
                assert_eq!(to, cycle_letter(from));
                expected = to;
            }
        }
        assert_eq!(grade_letter(&report.rubric[line]), Some(expected));
    }

    assert_eq!(report.rubric_writes as usize, store.save_count());
    assert_eq!(store.contents(), report.rubric);
}

/// 受保护模式下的任意阅卷员推进策略
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_any_worker_policy_advances_once_per_exam() {
    let mut config = fast_config(3, SyncMode::Guarded);
    config.advance_policy = AdvancePolicy::AnyWorker;
    config.marking_delay = DelayRange::new(0, 2);

    let report = run_session(config, two_line_store(), sentinel_exams()).await.unwrap();

    assert_eq!(report.exam_index, 2);
    assert_eq!(report.generation, 3);
    assert_eq!(report.exams_loaded, 3);
    // 哨兵试卷加载前的两份试卷都已批完
    assert!(report.marks_claimed >= 10);
    assert!(!report.has_race_artifacts());
}

/// 未同步模式：竞争必须是可能发生的，而不是被阻止
#[tokio::test]
async fn test_unsynchronized_mode_can_race() {
    let mut observed = false;
    for _ in 0..10 {
        let source = Arc::new(MemoryExamSource::new().with_exam("exam1.txt", &["1001"]));
        let report = run_session(fast_config(2, SyncMode::Unsynchronized), two_line_store(), source)
            .await
            .unwrap();

        assert!(report.terminated);
        if report.has_race_artifacts() || report.marks_claimed > 5 {
            observed = true;
            break;
        }
    }
    assert!(observed, "未同步模式下应能观察到重复批改或计数不一致");
}

/// 未同步模式：评分标准的丢失更新是可能的
#[tokio::test]
async fn test_unsynchronized_rubric_updates_can_be_lost() {
    let mut lost = false;
    for _ in 0..10 {
        let mut config = fast_config(2, SyncMode::Unsynchronized);
        config.rubric_change_probability = 1.0;
        let source = Arc::new(MemoryExamSource::new().with_exam("exam1.txt", &["1001"]));
        let report = run_session(config, two_line_store(), source).await.unwrap();

        let chain_broken = report.events.iter().any(|e| match e.event {
            Event::RubricWritten { from, to, .. } => to != cycle_letter(from),
            _ => false,
        });
        let writes = count(&report, |e| matches!(e, Event::RubricWritten { line: 0, .. }));
        let mut letter = 'A';
        for _ in 0..writes {
            letter = cycle_letter(letter);
        }
        if chain_broken || grade_letter(&report.rubric[0]) != Some(letter) {
            lost = true;
            break;
        }
    }
    assert!(lost, "未同步模式下应能观察到评分标准的丢失更新");
}

/// 未同步模式 + 任意阅卷员推进：同一份试卷可能被重复推进
#[tokio::test]
async fn test_unsynchronized_any_worker_can_advance_twice() {
    let mut duplicated = false;
    for _ in 0..20 {
        let mut source = MemoryExamSource::new();
        for i in 0..4 {
            let student = (3000 + i).to_string();
            source = source.with_exam(format!("exam{}.txt", i), &[student.as_str()]);
        }
        let source = Arc::new(source.with_exam("stop.txt", &["9999"]));

        let mut config = fast_config(3, SyncMode::Unsynchronized);
        config.advance_policy = AdvancePolicy::AnyWorker;
        let report = run_session(config, two_line_store(), source).await.unwrap();

        assert!(report.terminated);
        assert!(report.exam_index <= 4);

        let mut seen = HashSet::new();
        let repeated_load = report
            .events
            .iter()
            .filter_map(|e| match e.event {
                Event::ExamLoaded { index, .. } => Some(index),
                _ => None,
            })
            .any(|index| !seen.insert(index));
        let skew = count(&report, |e| {
            matches!(e, Event::RaceDetected { artifact: RaceArtifact::GenerationSkew { .. }, .. })
        }) > 0;

        if repeated_load || skew {
            duplicated = true;
            break;
        }
    }
    assert!(duplicated, "未同步模式下应能观察到重复推进");
}

/// 第一次保存就 panic 的评分标准存储
struct CrashOnFirstSave {
    inner: MemoryRubricStore,
    crashed: AtomicBool,
}

impl RubricStore for CrashOnFirstSave {
    fn load(&self) -> GradingResult<Vec<String>> {
        self.inner.load()
    }

    fn save(&self, lines: &[String]) -> GradingResult<()> {
        if !self.crashed.swap(true, Ordering::SeqCst) {
            panic!("磁盘控制器故障");
        }
        self.inner.save(lines)
    }

    fn location(&self) -> String {
        self.inner.location()
    }
}

/// 推进权持有者 panic 后，其余阅卷员不会卡在屏障上
#[tokio::test]
async fn test_panicking_worker_fails_run_instead_of_hanging() {
    let store = Arc::new(CrashOnFirstSave {
        inner: MemoryRubricStore::new(vec!["1, A".to_string(), "2, B".to_string()]),
        crashed: AtomicBool::new(false),
    });
    let mut config = fast_config(3, SyncMode::Guarded);
    config.rubric_change_probability = 1.0;

    let session = GradingSession::initialize(config, store, sentinel_exams()).await.unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), session.run())
        .await
        .expect("阅卷员 panic 后整个会话应当结束");

    assert!(matches!(result, Err(GradingError::WorkerAborted { .. })));
}

#[tokio::test]
async fn test_missing_exam_midway_is_fatal() {
    let source = Arc::new(
        MemoryExamSource::new()
            .with_exam("exam1.txt", &["1001"])
            .with_missing_exam("exam2.txt"),
    );

    let result = run_session(fast_config(3, SyncMode::Guarded), two_line_store(), source).await;
    assert!(matches!(result, Err(GradingError::StoreUnavailable { .. })));
}

#[tokio::test]
async fn test_unwritable_rubric_store_is_fatal_at_startup() {
    let source = sentinel_exams();
    let result = GradingSession::initialize(
        fast_config(2, SyncMode::Guarded),
        Arc::new(MemoryRubricStore::unavailable()),
        source,
    )
    .await;
    assert!(matches!(result, Err(GradingError::StoreUnavailable { .. })));
}

#[tokio::test]
async fn test_invalid_configuration_rejected_before_workers_start() {
    let source = sentinel_exams();
    let result = GradingSession::initialize(fast_config(0, SyncMode::Guarded), two_line_store(), source.clone()).await;
    assert!(matches!(result, Err(GradingError::ConfigurationInvalid { .. })));
    assert!(source.fetched().is_empty());

    let empty = Arc::new(MemoryExamSource::new());
    let result = GradingSession::initialize(fast_config(2, SyncMode::Guarded), two_line_store(), empty).await;
    assert!(matches!(result, Err(GradingError::ConfigurationInvalid { .. })));
}

#[tokio::test]
async fn test_file_backed_session_persists_rubric_and_events() {
    let dir = tempfile::tempdir().unwrap();
    let rubric_path = dir.path().join("rubric.txt");
    std::fs::write(&rubric_path, "1, A\n2, B\n").unwrap();

    let mut exam_files = Vec::new();
    for (i, student) in ["1001", "9999"].iter().enumerate() {
        let path = dir.path().join(format!("exam{}.txt", i + 1));
        std::fs::write(&path, format!("{}\nQ1 answer\n", student)).unwrap();
        exam_files.push(path.to_string_lossy().to_string());
    }

    let events_path = dir.path().join("events.jsonl");
    let mut config = fast_config(2, SyncMode::Guarded);
    config.rubric_path = rubric_path.clone();
    config.exam_files = exam_files;
    config.rubric_change_probability = 1.0;
    config.events_path = Some(events_path.clone());

    let session = GradingSession::from_config(config).await.unwrap();
    let report = session.run().await.unwrap();

    let saved = std::fs::read_to_string(&rubric_path).unwrap();
    let saved: Vec<&str> = saved.lines().collect();
    assert_eq!(saved.len(), 5);
    assert_eq!(saved, report.rubric.iter().map(String::as_str).collect::<Vec<_>>());

    let events = std::fs::read_to_string(&events_path).unwrap();
    assert_eq!(events.lines().count(), report.events.len());
    let first: serde_json::Value = serde_json::from_str(events.lines().next().unwrap()).unwrap();
    assert_eq!(first["kind"], "exam_loaded");
}

#[test]
fn test_missing_rubric_file_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let exam = dir.path().join("exam1.txt");
    std::fs::write(&exam, "1001\n").unwrap();

    let mut config = fast_config(2, SyncMode::Guarded);
    config.rubric_path = dir.path().join("absent.txt");
    config.exam_files = vec![exam.to_string_lossy().to_string()];

    let result = tokio_test::block_on(GradingSession::from_config(config));
    assert!(matches!(result, Err(GradingError::StoreUnavailable { .. })));
}
