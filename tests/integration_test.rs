//! End-to-end tests: notification in, single-band rasters and events out

use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bandsplit::compression::CompressionFactory;
use bandsplit::dispatch::{AuditInterceptor, Consumer, Dispatcher, InMemoryBroker, LoggingInterceptor};
use bandsplit::errors::PipelineError;
use bandsplit::raster::RasterDataset;
use bandsplit::store::{InMemoryMetadataStore, InMemoryObjectStore, ObjectStore};
use bandsplit::tiff::constants::{compression, photometric, planar_config, tags};
use bandsplit::tiff::{TagPayload, TiffWriter};
use bandsplit::worker::{ExtractorSettings, MultiLayerTiffWorker, Worker, WorkerRegistry};

const BUCKET: &str = "agro-photos";
const NOTIFICATIONS: &str = "agro.s3.notifications";
const RESULTS: &str = "agro.new.photos";
const AUDIT: &str = "agro.audit.messages";
const WIDTH: u32 = 5;
const HEIGHT: u32 = 4;

fn sample(band: u16, x: u32, y: u32) -> u16 {
    band * 1000 + (y * 10 + x) as u16
}

/// Three interleaved 16-bit bands, deflate compressed, georeferenced
fn three_band_geotiff() -> Vec<u8> {
    let mut pixels = Vec::new();
    for y in 0..HEIGHT {
        for x in 0..WIDTH {
            for band in 1..=3 {
                pixels.extend_from_slice(&sample(band, x, y).to_le_bytes());
            }
        }
    }
    let codec = CompressionFactory::create_handler(compression::DEFLATE as u64).unwrap();
    let strip = codec.compress(&pixels).unwrap();

    let mut writer = TiffWriter::new(false);
    writer.set_tag(tags::IMAGE_WIDTH, TagPayload::longs(&[WIDTH]));
    writer.set_tag(tags::IMAGE_LENGTH, TagPayload::longs(&[HEIGHT]));
    writer.set_tag(tags::BITS_PER_SAMPLE, TagPayload::shorts(&[16, 16, 16]));
    writer.set_tag(tags::COMPRESSION, TagPayload::shorts(&[compression::DEFLATE]));
    writer.set_tag(tags::PHOTOMETRIC_INTERPRETATION, TagPayload::shorts(&[photometric::RGB]));
    writer.set_tag(tags::SAMPLES_PER_PIXEL, TagPayload::shorts(&[3]));
    writer.set_tag(tags::PLANAR_CONFIGURATION, TagPayload::shorts(&[planar_config::CHUNKY]));
    writer.set_tag(tags::SAMPLE_FORMAT, TagPayload::shorts(&[1, 1, 1]));
    writer.set_tag(tags::MODEL_PIXEL_SCALE_TAG, TagPayload::doubles(&[10.0, 10.0, 0.0]));
    writer.set_tag(tags::MODEL_TIEPOINT_TAG, TagPayload::doubles(&[0.0, 0.0, 0.0, 500000.0, 4649776.0, 0.0]));
    writer.set_tag(tags::GEO_KEY_DIRECTORY_TAG, TagPayload::shorts(&[1, 1, 0, 2, 1024, 0, 1, 1, 3072, 0, 1, 32633]));
    writer.set_strips(HEIGHT, vec![strip]);

    let mut bytes = Vec::new();
    writer.write_to(&mut bytes).unwrap();
    bytes
}

fn settings(work_dir: &Path) -> ExtractorSettings {
    ExtractorSettings {
        bucket: BUCKET.to_string(),
        source_prefix: "new".to_string(),
        output_prefix: "converted".to_string(),
        work_dir: work_dir.to_path_buf(),
        io_timeout: Duration::from_secs(5),
    }
}

fn notification(id: &str) -> Vec<u8> {
    format!(r#"{{"EventName":"s3:ObjectCreated:Put","Key":"{}/new/{}.tif","Records":[]}}"#, BUCKET, id).into_bytes()
}

struct Pipeline {
    objects: Arc<InMemoryObjectStore>,
    broker: Arc<InMemoryBroker>,
    dispatcher: Arc<Dispatcher>,
    _work: tempfile::TempDir,
}

async fn pipeline(documents: Vec<serde_json::Value>) -> Pipeline {
    let work = tempfile::tempdir().unwrap();
    let metadata = Arc::new(InMemoryMetadataStore::new());
    for document in documents {
        metadata.insert(document).await.unwrap();
    }
    let objects = Arc::new(InMemoryObjectStore::new());
    objects.put_object(BUCKET, "new/abc.tif", three_band_geotiff(), "image/tiff").await.unwrap();

    let broker = InMemoryBroker::new(3);
    let worker: Arc<dyn Worker> = Arc::new(MultiLayerTiffWorker::new(objects.clone(), settings(work.path())));
    let registry = WorkerRegistry::from_workers(vec![worker]).unwrap();
    let dispatcher = Dispatcher::new(metadata, Arc::new(registry))
        .with_interceptor(Arc::new(LoggingInterceptor))
        .with_interceptor(Arc::new(AuditInterceptor::new(broker.clone(), "image-converter", AUDIT)))
        .with_completion_publisher(broker.clone(), RESULTS);

    Pipeline { objects, broker, dispatcher: Arc::new(dispatcher), _work: work }
}

fn open_output(bytes: &[u8]) -> (tempfile::TempDir, RasterDataset) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("band.tif");
    std::fs::write(&path, bytes).unwrap();
    let dataset = RasterDataset::open(&path).unwrap();
    (dir, dataset)
}

#[tokio::test]
async fn notification_produces_one_raster_per_layer() {
    let pipeline = pipeline(vec![json!({
        "_id": "abc",
        "type": "MultiLayerTiff",
        "photoExtension": "tif",
        "contourId": "contour-9",
        "date": "2024-05-01T10:00:00",
        "layers": [{"index": 1, "name": "red"}, {"index": 2, "name": "nir"}]
    })]).await;

    let report = pipeline.dispatcher.dispatch(&notification("abc")).await.unwrap();
    assert!(report.is_complete());
    assert_eq!(report.materialized(), vec!["converted/abc-red.tif", "converted/abc-nir.tif"]);
    assert_eq!(report.skipped_bands, 1);

    assert_eq!(pipeline.objects.paths(BUCKET).await,
               vec!["converted/abc-nir.tif", "converted/abc-red.tif", "new/abc.tif"]);

    let nir = pipeline.objects.object(BUCKET, "converted/abc-nir.tif").await.unwrap();
    assert_eq!(nir.content_type, "image/tiff");

    let (_dir, mut dataset) = open_output(&nir.data);
    let profile = dataset.profile().clone();
    assert_eq!((profile.width, profile.height, profile.band_count), (WIDTH, HEIGHT, 1));
    assert_eq!(profile.dtype(), "uint16");
    assert_eq!(profile.compression, compression::DEFLATE);
    assert_eq!(profile.geo_transform(), Some([10.0, 0.0, 500000.0, 0.0, -10.0, 4649776.0]));
    assert_eq!(profile.epsg(), Some(32633));

    let band = dataset.read_band(1).unwrap();
    let values: Vec<u16> = band.chunks_exact(2).map(|b| u16::from_le_bytes([b[0], b[1]])).collect();
    let expected: Vec<u16> = (0..HEIGHT)
        .flat_map(|y| (0..WIDTH).map(move |x| sample(2, x, y)))
        .collect();
    assert_eq!(values, expected);

    let results = pipeline.broker.messages(RESULTS).await;
    assert_eq!(results.len(), 1);
    let event: serde_json::Value = serde_json::from_slice(&results[0].payload).unwrap();
    assert_eq!(event, json!({
        "photoId": "abc",
        "contourId": "contour-9",
        "date": "2024-05-01T10:00:00Z",
        "extension": "tif"
    }));

    let audit = pipeline.broker.messages(AUDIT).await;
    let record: serde_json::Value = serde_json::from_slice(&audit[0].payload).unwrap();
    assert_eq!(record["status"], "success");
    assert_eq!(record["outputs"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn unknown_type_writes_nothing() {
    let pipeline = pipeline(vec![json!({"_id": "abc", "type": "Panorama", "layers": ["red"]})]).await;

    let result = pipeline.dispatcher.dispatch(&notification("abc")).await;
    assert!(matches!(result, Err(PipelineError::WorkerNotFound(_))));
    assert_eq!(pipeline.objects.paths(BUCKET).await, vec!["new/abc.tif"]);
    assert!(pipeline.broker.messages(RESULTS).await.is_empty());
}

#[tokio::test]
async fn consumer_processes_a_stream_of_notifications() {
    let pipeline = pipeline(vec![
        json!({"_id": "abc", "type": "MultiLayerTiff", "extension": "tif", "layers": ["b1", "b2", "b3", "b4"]}),
    ]).await;

    let notifications = [notification("abc"), b"not json".to_vec(), notification("ghost")];
    for payload in notifications {
        pipeline.broker.send(NOTIFICATIONS, Some("agro-photos"), payload).await;
    }
    pipeline.broker.close().await;

    let subscription = pipeline.broker.subscribe(NOTIFICATIONS).await;
    let consumer = Consumer::new(Arc::new(subscription), pipeline.dispatcher.clone());
    let stats = consumer.run().await.unwrap();

    assert_eq!((stats.received, stats.succeeded, stats.failed), (3, 1, 2));
    let outputs: Vec<String> = pipeline.objects.paths(BUCKET).await
        .into_iter()
        .filter(|path| path.starts_with("converted/"))
        .collect();
    assert_eq!(outputs, vec!["converted/abc-b1.tif", "converted/abc-b2.tif", "converted/abc-b3.tif"]);
    // No contourId or date, so nothing to announce
    assert!(pipeline.broker.messages(RESULTS).await.is_empty());
    assert_eq!(pipeline.broker.messages(AUDIT).await.len(), 2);
}
