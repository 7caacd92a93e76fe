//! End-to-end scans over synthetic metadata held in snapshot sources

use pretty_assertions::assert_eq;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use typescope::config::Config;
use typescope::core::types::{
    Address, DecodeError, MemoryError, MemoryResult, ModuleInfo, PointerWidth,
    ProcessArchitecture, ScanError,
};
use typescope::memory::{
    BufferSource, MemoryRegion, MemorySource, SnapshotBuilder, SnapshotSource, TimeoutSource,
};
use typescope::metadata::layout::{header_size, TYPE_ROW_SIZE};
use typescope::metadata::{ImageBuilder, MetadataImage, TypeSpec};
use typescope::scan::{
    CancellationToken, EventSink, LogLevel, ScanCoordinator, ScanEvent, ScanOutcome, ScanProgress,
    ScanState,
};

const MODULE_BASE: Address = Address::new(0x7ff6_2000_0000);
const MODULE: &str = "Assembly-CSharp";

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<ScanEvent>>,
}

impl Recorder {
    fn events(&self) -> Vec<ScanEvent> {
        self.events.lock().unwrap().clone()
    }

    fn progress(&self) -> Vec<ScanProgress> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ScanEvent::Progress(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    fn logs(&self, level: LogLevel) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ScanEvent::Log { level: l, message } if l == level => Some(message),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for Recorder {
    fn emit(&self, event: ScanEvent) {
        self.events.lock().unwrap().push(event);
    }
}

fn module_image(builder: &ImageBuilder) -> MetadataImage {
    builder.build_module(MODULE_BASE, 0x40).unwrap()
}

fn target(builder: &ImageBuilder) -> SnapshotSource {
    let image = module_image(builder);
    SnapshotBuilder::new(31337, "game.exe", ProcessArchitecture::X64)
        .module("Assembly-CSharp.dll", image.base, image.bytes.len() as u64)
        .region(image.base, &image.bytes)
        .build()
        .into_source()
        .unwrap()
}

fn run(
    target: &SnapshotSource,
    config: &Config,
    sink: &dyn EventSink,
    cancel: &CancellationToken,
) -> Result<ScanOutcome, ScanError> {
    ScanCoordinator::new(config).scan(target, target, MODULE, sink, cancel)
}

fn three_by_two() -> ImageBuilder {
    ImageBuilder::new(PointerWidth::Bits64)
        .with_type(
            TypeSpec::class("Game", "Player")
                .field("m_Health", "System.Single", 0x18)
                .field("m_Name", "System.String", 0x20),
        )
        .with_type(
            TypeSpec::class("Game", "Weapon")
                .field("m_Damage", "System.Int32", 0x10)
                .field("m_Owner", "Game.Player", 0x18),
        )
        .with_type(
            TypeSpec::structure("Game", "Stats")
                .field("strength", "System.Int32", 0x0)
                .field("agility", "System.Int32", 0x4),
        )
}

#[test]
fn test_three_types_two_fields_each() {
    let target = target(&three_by_two());
    let recorder = Recorder::default();
    let outcome = run(&target, &Config::default(), &recorder, &CancellationToken::new()).unwrap();

    let report = outcome.into_report().unwrap();
    assert_eq!(report.rows_total, 3);
    assert!(report.row_errors.is_empty());
    assert!(report.duplicates.is_empty());

    let catalog = report.catalog;
    assert_eq!(catalog.len(), 3);
    for type_def in catalog.iter() {
        assert_eq!(type_def.fields().len(), 2);
    }
    let offsets = |name: &str| -> Vec<u64> {
        catalog
            .lookup(name)
            .unwrap()
            .fields()
            .iter()
            .map(|f| f.offset())
            .collect()
    };
    assert_eq!(offsets("Game.Player"), vec![0x18, 0x20]);
    assert_eq!(offsets("Game.Weapon"), vec![0x10, 0x18]);
    assert_eq!(offsets("Game.Stats"), vec![0x0, 0x4]);

    let progress = recorder.progress();
    let complete: Vec<_> = progress.iter().filter(|p| p.fraction == 1.0).collect();
    assert_eq!(complete.len(), 1);
    assert_eq!(progress.last(), Some(&ScanProgress::new(3, 3)));
    assert!(progress.windows(2).all(|w| w[0].fraction <= w[1].fraction));

    let events = recorder.events();
    assert_eq!(events.last(), Some(&ScanEvent::State(ScanState::Completed)));
}

#[test]
fn test_progress_every_row_is_ordered() {
    let target = target(&three_by_two());
    let mut config = Config::default();
    config.scan.progress_interval = 1;
    let recorder = Recorder::default();
    run(&target, &config, &recorder, &CancellationToken::new()).unwrap();

    let processed: Vec<u32> = recorder.progress().iter().map(|p| p.processed).collect();
    assert_eq!(processed, vec![1, 2, 3]);
}

#[test]
fn test_zero_rows() {
    let target = target(&ImageBuilder::new(PointerWidth::Bits64));
    let recorder = Recorder::default();
    let outcome = run(&target, &Config::default(), &recorder, &CancellationToken::new()).unwrap();

    let report = outcome.into_report().unwrap();
    assert!(report.catalog.is_empty());
    assert_eq!(report.rows_total, 0);
    assert_eq!(recorder.progress(), vec![ScanProgress::new(0, 0)]);
    assert_eq!(recorder.progress()[0].fraction, 1.0);
}

#[test]
fn test_overlong_row_count_is_logged_and_skipped() {
    let builder = three_by_two().declared_type_count(4);
    let target = target(&builder);
    let recorder = Recorder::default();
    let outcome = run(&target, &Config::default(), &recorder, &CancellationToken::new()).unwrap();

    let report = outcome.into_report().unwrap();
    assert_eq!(report.catalog.len(), 3);
    assert_eq!(report.rows_total, 4);
    assert_eq!(report.row_errors.len(), 1);
    assert_eq!(report.row_errors[0].index, 3);
    assert!(report.row_errors[0].error.is_memory_error());

    let warnings = recorder.logs(LogLevel::Warn);
    assert!(warnings.iter().any(|w| w.contains("type row 3")));
    assert_eq!(recorder.progress().last(), Some(&ScanProgress::new(4, 4)));
}

#[test]
fn test_reads_failing_after_header_still_complete() {
    let image = module_image(&three_by_two());
    let page = 0x1000usize;
    let root = (image.root.as_u64() - image.base.as_u64()) as usize;
    let header_end = root + header_size(PointerWidth::Bits64) as usize;

    // Module page and root header readable; heap, fields and type rows not
    let target = SnapshotBuilder::new(31337, "game.exe", ProcessArchitecture::X64)
        .module("Assembly-CSharp.dll", image.base, image.bytes.len() as u64)
        .region(image.base, &image.bytes[..page])
        .protected_region(
            Address::new(image.base.as_u64() + page as u64),
            &image.bytes[page..root],
        )
        .region(image.root, &image.bytes[root..header_end])
        .protected_region(
            Address::new(image.base.as_u64() + header_end as u64),
            &image.bytes[header_end..],
        )
        .build()
        .into_source()
        .unwrap();

    let recorder = Recorder::default();
    let outcome = run(&target, &Config::default(), &recorder, &CancellationToken::new()).unwrap();
    let report = outcome.into_report().unwrap();
    assert!(report.catalog.is_empty());
    assert_eq!(report.row_errors.len(), 3);
    assert!(report.row_errors.iter().all(|e| e.error.is_memory_error()));
    assert_eq!(recorder.logs(LogLevel::Warn).len(), 3);
}

#[test]
fn test_unreadable_header_fails_scan() {
    let image = module_image(&three_by_two());
    let root = (image.root.as_u64() - image.base.as_u64()) as usize;

    let target = SnapshotBuilder::new(31337, "game.exe", ProcessArchitecture::X64)
        .module("Assembly-CSharp.dll", image.base, image.bytes.len() as u64)
        .region(image.base, &image.bytes[..root + 4])
        .build()
        .into_source()
        .unwrap();

    let recorder = Recorder::default();
    let err = run(&target, &Config::default(), &recorder, &CancellationToken::new()).unwrap_err();
    assert!(matches!(err, ScanError::MemoryAccess(_)));
    assert!(recorder.progress().is_empty());
    assert_eq!(
        recorder.events().last(),
        Some(&ScanEvent::State(ScanState::Failed))
    );
}

/// Cancels the scan when the first progress event arrives
struct CancelOnProgress {
    cancel: CancellationToken,
    recorder: Recorder,
}

impl EventSink for CancelOnProgress {
    fn emit(&self, event: ScanEvent) {
        if matches!(event, ScanEvent::Progress(_)) {
            self.cancel.cancel();
        }
        self.recorder.emit(event);
    }
}

#[test]
fn test_cancel_mid_scan() {
    let builder = (0..50).fold(ImageBuilder::new(PointerWidth::Bits64), |b, i| {
        b.with_type(TypeSpec::class("Game", &format!("Type{}", i)))
    });
    let target = target(&builder);
    let mut config = Config::default();
    config.scan.progress_interval = 5;

    let sink = CancelOnProgress {
        cancel: CancellationToken::new(),
        recorder: Recorder::default(),
    };
    let outcome = run(&target, &config, &sink, &sink.cancel).unwrap();
    assert!(outcome.is_cancelled());
    assert!(outcome.catalog().is_none());

    let events = sink.recorder.events();
    let first_progress = events
        .iter()
        .position(|e| matches!(e, ScanEvent::Progress(_)))
        .unwrap();
    assert!(!events[first_progress + 1..]
        .iter()
        .any(|e| matches!(e, ScanEvent::Progress(_))));
    assert_eq!(events.last(), Some(&ScanEvent::State(ScanState::Cancelled)));
    assert_eq!(sink.recorder.progress(), vec![ScanProgress::new(5, 50)]);
}

#[test]
fn test_duplicate_names_keep_first() {
    let builder = ImageBuilder::new(PointerWidth::Bits64)
        .with_type(TypeSpec::class("Game", "Player").field("first", "System.Int32", 0x10))
        .with_type(TypeSpec::class("Game", "Player").field("second", "System.Int32", 0x20))
        .with_type(TypeSpec::class("Game", "Enemy"));
    let target = target(&builder);
    let recorder = Recorder::default();
    let report = run(&target, &Config::default(), &recorder, &CancellationToken::new())
        .unwrap()
        .into_report()
        .unwrap();

    assert_eq!(report.catalog.len(), 2);
    assert_eq!(report.duplicates, vec!["Game.Player".to_string()]);
    assert!(report.catalog.get_field("Game.Player", "first").is_ok());
    assert!(report.catalog.get_field("Game.Player", "second").is_err());
    assert!(recorder
        .logs(LogLevel::Warn)
        .iter()
        .any(|w| w.contains("Duplicate type name Game.Player")));

    let mut names: Vec<&str> = report.catalog.iter().map(|t| t.full_name()).collect();
    let before = names.len();
    names.dedup();
    assert_eq!(names.len(), before);
}

#[test]
fn test_thirty_two_bit_big_endian_target() {
    let builder = three_by_two()
        .pointer_width(PointerWidth::Bits32)
        .endian(typescope::memory::Endian::Big);
    let image = builder.build_module(Address::new(0x1000_0000), 0x40).unwrap();
    let target = SnapshotBuilder::new(7, "legacy.exe", ProcessArchitecture::X86)
        .module("Assembly-CSharp.dll", image.base, image.bytes.len() as u64)
        .region(image.base, &image.bytes)
        .build()
        .into_source()
        .unwrap();

    let recorder = Recorder::default();
    let report = run(&target, &Config::default(), &recorder, &CancellationToken::new())
        .unwrap()
        .into_report()
        .unwrap();
    assert_eq!(report.catalog.len(), 3);
    assert_eq!(
        report.catalog.get_field("Game.Weapon", "m_Owner").unwrap().offset(),
        0x18
    );
    assert!(recorder.logs(LogLevel::Warn).is_empty());
}

/// Stalls every read that starts at `stall_at`
struct StallAt {
    inner: BufferSource,
    stall_at: Address,
}

impl MemorySource for StallAt {
    fn read(&self, region: MemoryRegion) -> MemoryResult<Vec<u8>> {
        if region.address == self.stall_at {
            thread::sleep(Duration::from_millis(400));
        }
        self.inner.read(region)
    }
}

fn scan_with_stall(
    image: &MetadataImage,
    stall_at: Address,
    recorder: &Recorder,
) -> Result<ScanOutcome, ScanError> {
    let inner: Arc<dyn MemorySource> = Arc::new(StallAt {
        inner: BufferSource::with_segment(image.base, image.bytes.clone()),
        stall_at,
    });
    let source = TimeoutSource::new(inner, Duration::from_millis(50)).unwrap();
    let module = ModuleInfo::new(
        "Assembly-CSharp.dll".to_string(),
        image.base,
        image.bytes.len() as u64,
    );
    ScanCoordinator::new(&Config::default()).scan_root(
        module,
        image.root,
        &source,
        recorder,
        &CancellationToken::new(),
    )
}

#[test]
fn test_row_timeout_skips_only_that_row() {
    let image = three_by_two().build(Address::new(0x50_0000)).unwrap();
    let second_row = Address::new(
        image.root.as_u64() + header_size(PointerWidth::Bits64) + u64::from(TYPE_ROW_SIZE),
    );
    let recorder = Recorder::default();
    let report = scan_with_stall(&image, second_row, &recorder)
        .unwrap()
        .into_report()
        .unwrap();

    assert_eq!(report.catalog.len(), 2);
    assert!(report.catalog.lookup("Game.Weapon").is_err());
    assert_eq!(report.row_errors.len(), 1);
    assert_eq!(report.row_errors[0].index, 1);
    assert!(matches!(
        report.row_errors[0].error,
        DecodeError::Memory(MemoryError::Timeout { timeout_ms: 50, .. })
    ));
    assert_eq!(
        recorder.events().last(),
        Some(&ScanEvent::State(ScanState::Completed))
    );
}

#[test]
fn test_header_timeout_fails_scan() {
    let image = three_by_two().build(Address::new(0x50_0000)).unwrap();
    let recorder = Recorder::default();
    let err = scan_with_stall(&image, image.root, &recorder).unwrap_err();

    assert!(matches!(
        err,
        ScanError::MemoryAccess(MemoryError::Timeout { .. })
    ));
    assert!(recorder.progress().is_empty());
    assert_eq!(
        recorder.events().last(),
        Some(&ScanEvent::State(ScanState::Failed))
    );
}
