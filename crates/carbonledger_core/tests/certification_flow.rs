use carbonledger_core::db::open_db_in_memory;
use carbonledger_core::{
    ActivityKind, CannedReplyClassifier, CertificationService, CertificationStatus, Classifier,
    ClassifierError, ClassifierRequest, Evidence, EvidenceVerifier, FallbackPolicy, RecordStore,
    RewardDelta, SqliteRecordStore, SubmissionMetadata, SubmitError, UserProgress,
    ValidationError, VerdictSource, VerifierConfig,
};
use rusqlite::Connection;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

struct SlowClassifier {
    delay: Duration,
}

impl Classifier for SlowClassifier {
    fn classifier_id(&self) -> &str {
        "slow"
    }

    fn classify(&self, _request: &ClassifierRequest) -> Result<String, ClassifierError> {
        thread::sleep(self.delay);
        Ok("VALID: false\nCONFIDENCE: 99".to_string())
    }
}

#[derive(Default)]
struct CountingClassifier {
    calls: AtomicUsize,
}

impl Classifier for CountingClassifier {
    fn classifier_id(&self) -> &str {
        "counting"
    }

    fn classify(&self, _request: &ClassifierRequest) -> Result<String, ClassifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok("VALID: true\nCONFIDENCE: 90".to_string())
    }
}

fn verifier(classifier: Arc<dyn Classifier>) -> EvidenceVerifier {
    EvidenceVerifier::new(classifier, VerifierConfig::default())
}

fn service(
    conn: &mut Connection,
    verifier: EvidenceVerifier,
) -> CertificationService<SqliteRecordStore<'_>> {
    CertificationService::new(SqliteRecordStore::try_new(conn).unwrap(), verifier)
}

fn photo() -> Evidence {
    Evidence::new("uploads/photo.jpg", vec![0xFF, 0xD8, 0xFF, 0xE0])
}

#[test]
fn accepted_tumbler_credits_points_carbon_and_a_tree() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = service(
        &mut conn,
        verifier(Arc::new(CannedReplyClassifier::new(
            "VALID:true\nCONFIDENCE:85\nREASON: steel tumbler at a cafe counter",
        ))),
    );

    let record = service
        .submit_activity(
            "user-1",
            ActivityKind::Tumbler,
            &photo(),
            &SubmissionMetadata::default(),
        )
        .unwrap();

    assert_eq!(record.status, CertificationStatus::Accepted);
    assert!(record.verdict.valid);
    assert_eq!(record.verdict.confidence, 85);
    assert_eq!(record.verdict.source, VerdictSource::Model);
    assert_eq!(
        record.reward,
        RewardDelta {
            carbon_reduction_kg: 0.3,
            points: 15
        }
    );
    assert!(record.resolved_at.is_some());
    assert_eq!(record.evidence_ref, "uploads/photo.jpg");

    let progress = service.progress("user-1").unwrap();
    assert_eq!(progress.total_points, 15);
    assert_eq!(progress.total_trees, 1);
    assert_eq!(progress.level, 1);
    assert_eq!(progress.total_carbon_reduction_kg, 0.3);
}

#[test]
fn classifier_timeout_falls_back_to_credit() {
    let mut conn = open_db_in_memory().unwrap();
    let config = VerifierConfig {
        timeout_ms: 50,
        ..VerifierConfig::default()
    };
    let slow = Arc::new(SlowClassifier {
        delay: Duration::from_millis(500),
    });
    let mut service = service(&mut conn, EvidenceVerifier::new(slow, config));

    let record = service
        .submit_activity(
            "user-1",
            ActivityKind::Tumbler,
            &photo(),
            &SubmissionMetadata::default(),
        )
        .unwrap();

    assert_eq!(record.verdict.source, VerdictSource::Fallback);
    assert!(record.verdict.valid);
    assert_eq!(record.verdict.confidence, 75);
    assert_eq!(record.verdict.reason, "fallback");
    assert_eq!(record.classifier_reply, None);
    assert_eq!(record.status, CertificationStatus::Accepted);
    assert_eq!(record.reward.points, 15);
    assert_eq!(service.progress("user-1").unwrap().total_trees, 1);
}

#[test]
fn reject_policy_turns_fallback_into_rejection() {
    let mut conn = open_db_in_memory().unwrap();
    let config = VerifierConfig {
        fallback_policy: FallbackPolicy::Reject,
        ..VerifierConfig::default()
    };
    let mut service = service(
        &mut conn,
        EvidenceVerifier::new(Arc::new(CannedReplyClassifier::new("no idea")), config),
    );

    let record = service
        .submit_activity(
            "user-1",
            ActivityKind::Refill,
            &photo(),
            &SubmissionMetadata::default(),
        )
        .unwrap();

    assert_eq!(record.status, CertificationStatus::Rejected);
    assert_eq!(record.verdict.source, VerdictSource::Fallback);
    assert_eq!(record.reward, RewardDelta::ZERO);
    assert_eq!(record.classifier_reply.as_deref(), Some("no idea"));
}

#[test]
fn worn_appliance_listing_earns_condition_scaled_carbon() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = service(&mut conn, verifier(Arc::new(CannedReplyClassifier::offline())));

    let record = service
        .submit_activity(
            "user-1",
            ActivityKind::Secondhand,
            &photo(),
            &SubmissionMetadata::goods("가전", "오래됨"),
        )
        .unwrap();

    assert_eq!(record.status, CertificationStatus::Accepted);
    assert_eq!(record.reward.carbon_reduction_kg, 10.2);
    assert_eq!(record.reward.points, 20);
    assert_eq!(service.progress("user-1").unwrap().total_trees, 0);
}

#[test]
fn single_day_volunteering_earns_category_base() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = service(&mut conn, verifier(Arc::new(CannedReplyClassifier::offline())));

    let record = service
        .submit_activity(
            "user-1",
            ActivityKind::Volunteer,
            &photo(),
            &SubmissionMetadata::dated("2023-06-10", "2023-06-10", "환경보호"),
        )
        .unwrap();

    assert_eq!(record.reward.carbon_reduction_kg, 5.0);
    assert_eq!(record.reward.points, 50);
    let progress = service.progress("user-1").unwrap();
    assert_eq!(progress.total_carbon_reduction_kg, 5.0);
    assert_eq!(progress.total_trees, 0);
}

#[test]
fn mailbox_cleanup_is_priced_by_quantity() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = service(&mut conn, verifier(Arc::new(CannedReplyClassifier::offline())));

    let record = service
        .submit_activity(
            "user-1",
            ActivityKind::Email,
            &photo(),
            &SubmissionMetadata::counted(1_000),
        )
        .unwrap();

    assert_eq!(record.reward.carbon_reduction_kg, 0.1);
    assert_eq!(record.reward.points, 100);
}

#[test]
fn rejected_verdict_records_zero_reward_and_leaves_progress() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = service(
        &mut conn,
        verifier(Arc::new(CannedReplyClassifier::new(
            "VALID: false\nCONFIDENCE: 92\nREASON: no container visible",
        ))),
    );

    let record = service
        .submit_activity(
            "user-1",
            ActivityKind::Container,
            &photo(),
            &SubmissionMetadata::default(),
        )
        .unwrap();

    assert_eq!(record.status, CertificationStatus::Rejected);
    assert_eq!(record.reward, RewardDelta::ZERO);
    assert_eq!(record.verdict.reason, "no container visible");
    assert_eq!(
        service.progress("user-1").unwrap(),
        UserProgress::empty("user-1")
    );
    assert_eq!(service.history("user-1", None).unwrap(), vec![record]);
}

#[test]
fn invalid_input_creates_no_record_and_skips_classifier() {
    let mut conn = open_db_in_memory().unwrap();
    let counting = Arc::new(CountingClassifier::default());
    let mut service = service(&mut conn, verifier(counting.clone()));

    let err = service
        .submit_activity(
            "  ",
            ActivityKind::Tumbler,
            &photo(),
            &SubmissionMetadata::default(),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        SubmitError::Validation(ValidationError::EmptyUserId)
    ));

    let err = service
        .submit_activity(
            "user-1",
            ActivityKind::Tumbler,
            &Evidence::new("uploads/empty.jpg", Vec::new()),
            &SubmissionMetadata::default(),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        SubmitError::Validation(ValidationError::MissingEvidence)
    ));

    let err = service
        .submit_activity(
            "user-1",
            ActivityKind::Volunteer,
            &photo(),
            &SubmissionMetadata::default(),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        SubmitError::Validation(ValidationError::MissingMetadata {
            field: "start_date",
            ..
        })
    ));

    let err = service
        .submit_activity(
            "user-1",
            ActivityKind::ExternalProgram,
            &photo(),
            &SubmissionMetadata::dated("2023-07-01", "2023-06-01", "환경"),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        SubmitError::Validation(ValidationError::ReversedDateRange { .. })
    ));

    assert_eq!(counting.calls.load(Ordering::SeqCst), 0);
    assert!(service.history("user-1", None).unwrap().is_empty());
}

#[test]
fn tenth_tree_reaches_level_two_and_syncs_profile() {
    let mut conn = open_db_in_memory().unwrap();
    {
        let mut service =
            service(&mut conn, verifier(Arc::new(CannedReplyClassifier::offline())));
        for _ in 0..10 {
            service
                .submit_activity(
                    "user-1",
                    ActivityKind::Tumbler,
                    &photo(),
                    &SubmissionMetadata::default(),
                )
                .unwrap();
        }

        let progress = service.progress("user-1").unwrap();
        assert_eq!(progress.total_trees, 10);
        assert_eq!(progress.level, 2);
        assert_eq!(progress.total_points, 150);
        assert_eq!(progress.total_carbon_reduction_kg, 3.0);
        let recent = service
            .store()
            .list_records_for_user("user-1", Some(3))
            .unwrap();
        assert_eq!(recent.len(), 3);
    }

    let (points, trees, level): (i64, i64, i64) = conn
        .query_row(
            "SELECT points, trees, level FROM user_profiles WHERE user_id = 'user-1';",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .unwrap();
    assert_eq!((points, trees, level), (150, 10, 2));
}
