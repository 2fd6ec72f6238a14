use farmer_ingest::application::IngestPipeline;
use farmer_ingest::domain::ingest_config::{DuplicatePolicy, IngestConfig};
use farmer_ingest::domain::validation::ViolationKind;
use farmer_ingest::infrastructure::db::sqlite::SqliteFarmerSink;
use farmer_ingest::infrastructure::db::FarmerSink;
use farmer_ingest::infrastructure::source::MemorySource;

fn two_sheets() -> MemorySource {
    MemorySource::new()
        .with_sheet(
            "A",
            &[
                &["S.no", "Status", "Farmer Code", "Farmer Name", "Village"],
                &["1", "New", "F001", "Asha", "Kampli"],
                &["2", "Old", "", "", ""],
            ],
        )
        .with_sheet(
            "B",
            &[
                &["Sl.No", "Farmer Status", "FarmerCode", "Name", "Village Name"],
                &["1", "verified", "F002", "Bala", "Siruguppa"],
            ],
        )
}

async fn memory_sink() -> SqliteFarmerSink {
    SqliteFarmerSink::connect("sqlite::memory:", "bellary_farmers")
        .await
        .unwrap()
}

#[test]
fn two_sheets_merge_into_two_records() {
    let pipeline = IngestPipeline::new(IngestConfig::default()).unwrap();
    let run = pipeline.prepare(&mut two_sheets()).unwrap();

    assert_eq!(run.records.len(), 2);
    assert_eq!(run.records[0].source_sheet, "A");
    assert_eq!(run.records[0].farmer_code, "F001");
    assert_eq!(run.records[1].source_sheet, "B");
    assert_eq!(run.records[1].farmer_code, "F002");
    assert_eq!(run.records[1].village, "Siruguppa");
    assert_eq!(run.records[0].imported_at, run.records[1].imported_at);

    assert_eq!(run.summary.sheets[0].discarded, 1);
    assert_eq!(run.summary.sheets[0].status_only_rows, 1);
    assert_eq!(run.summary.sheets[1].discarded, 0);
    assert_eq!(run.summary.merged_records, 2);
}

#[tokio::test]
async fn second_run_is_idempotent() {
    let sink = memory_sink().await;
    let pipeline = IngestPipeline::new(IngestConfig::default()).unwrap();

    let first = pipeline
        .run(&mut two_sheets(), Some(&sink), true)
        .await
        .unwrap();
    let load = first.load.unwrap();
    assert_eq!(load.inserted, 2);
    assert_eq!(first.table_stats.unwrap().total_records, 2);
    let before = sink.fetch_farmer("F001").await.unwrap().unwrap();

    let second = pipeline
        .run(&mut two_sheets(), Some(&sink), true)
        .await
        .unwrap();
    let load = second.load.unwrap();
    assert_eq!(load.inserted, 0);
    assert_eq!(load.updated, 0);
    assert_eq!(load.unchanged, 2);

    let after = sink.fetch_farmer("F001").await.unwrap().unwrap();
    assert_eq!(after.updated_at, before.updated_at);
    assert_eq!(after.record.imported_at, before.record.imported_at);
    assert_eq!(after, before);
}

#[tokio::test]
async fn duplicate_policies_pick_different_survivors() {
    let duplicated = || {
        MemorySource::new()
            .with_sheet(
                "A",
                &[
                    &["Farmer Code", "Farmer Name", "Village"],
                    &["F001", "Asha", "Kampli"],
                ],
            )
            .with_sheet(
                "B",
                &[
                    &["Farmer Code", "Farmer Name", "Village"],
                    &["F001", "Asha Kumari", "Kampli"],
                ],
            )
    };

    let drop_new = IngestPipeline::new(IngestConfig::default()).unwrap();
    let sink = memory_sink().await;
    let summary = drop_new.run(&mut duplicated(), Some(&sink), true).await.unwrap();
    let stored = sink.fetch_farmer("F001").await.unwrap().unwrap();
    assert_eq!(stored.record.source_sheet, "A");
    assert!(summary.sheets[1].issues[0]
        .violations
        .iter()
        .any(|v| v.rule == ViolationKind::DuplicateKey));

    let mut config = IngestConfig::default();
    config.duplicate_policy = DuplicatePolicy::KeepLast;
    let keep_last = IngestPipeline::new(config).unwrap();
    let sink = memory_sink().await;
    let summary = keep_last.run(&mut duplicated(), Some(&sink), true).await.unwrap();
    let stored = sink.fetch_farmer("F001").await.unwrap().unwrap();
    assert_eq!(stored.record.source_sheet, "B");
    assert_eq!(stored.record.farmer_name, "Asha Kumari");
    assert_eq!(summary.superseded.len(), 1);
    assert_eq!(sink.table_stats().await.unwrap().total_records, 1);
}

#[tokio::test]
async fn no_processable_sheet_is_a_total_failure() {
    let mut source = MemorySource::new().with_sheet("A", &[&["S.no", "Status"], &["1", "Old"]]);
    let sink = memory_sink().await;
    let pipeline = IngestPipeline::new(IngestConfig::default()).unwrap();

    let summary = pipeline.run(&mut source, Some(&sink), true).await.unwrap();
    assert!(summary.is_total_failure());
    assert!(summary.load.is_none());
}
