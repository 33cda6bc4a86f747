// ============================================================================
// BATCH EXPORT — render a frame sequence through the layer stack, in chunks
// ============================================================================
//
// Frames are fetched and rendered one at a time on the calling thread (the
// GPU is single-threaded); each finished chunk is PNG-encoded in parallel
// with rayon and handed to a `ChunkSink`.  A frame that fails to fetch or
// render is logged and counted, and the batch moves on.  Only device loss
// or a sink failure aborts the run.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use image::RgbaImage;
use rayon::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use crate::components::layers::Layer;
use crate::error::{EngineError, EngineResult, ExportError, FxResult};

// ============================================================================
// SEAMS
// ============================================================================

/// Where batch frames come from.  Fetching may fail per frame.
pub trait FrameSource {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn fetch(&mut self, index: usize) -> FxResult<RgbaImage>;

    /// Human-readable name of frame `index`, used in logs.
    fn label(&self, index: usize) -> String {
        format!("frame {}", index)
    }
}

/// Renders one frame at the frame's own resolution.
pub trait FrameRenderer {
    fn render_frame(&mut self, image: &RgbaImage, layers: &[Layer]) -> EngineResult<RgbaImage>;
}

/// Receives finished chunks in order.
pub trait ChunkSink {
    fn deliver(&mut self, chunk: ExportChunk) -> Result<(), String>;
}

/// Image files on disk, one frame each.
pub struct PathFrames {
    paths: Vec<PathBuf>,
}

impl PathFrames {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }
}

impl FrameSource for PathFrames {
    fn len(&self) -> usize {
        self.paths.len()
    }

    fn fetch(&mut self, index: usize) -> FxResult<RgbaImage> {
        let path = self
            .paths
            .get(index)
            .ok_or_else(|| crate::error::FxError::manifest(format!("no frame {}", index)))?;
        crate::io::load_image(path)
    }

    fn label(&self, index: usize) -> String {
        self.paths
            .get(index)
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| format!("frame {}", index))
    }
}

// ============================================================================
// CHUNKS + REPORT
// ============================================================================

#[derive(Clone, Debug)]
pub struct EncodedFrame {
    pub frame_index: usize,
    pub png: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct ExportChunk {
    pub batch_id: Uuid,
    pub chunk_index: usize,
    pub total_chunks: usize,
    /// The receiver finalises on this chunk.
    pub is_final: bool,
    pub frames: Vec<EncodedFrame>,
}

#[derive(Clone, Debug, Default)]
pub struct BatchReport {
    pub batch_id: Uuid,
    pub rendered: usize,
    /// `(frame index, message)` for every frame that was skipped.
    pub failed: Vec<(usize, String)>,
    pub chunks_delivered: usize,
    pub cancelled: bool,
}

#[derive(Debug)]
pub enum BatchOutcome {
    Completed(BatchReport),
    /// Another export was in flight; nothing was done.
    AlreadyRunning,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BatchSettings {
    /// Frames per delivered chunk (at least 1).
    pub chunk_size: usize,
    /// Seed advance per frame for animated layers.
    pub seed_stride: f32,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self { chunk_size: 8, seed_stride: 1.0 }
    }
}

/// The layer list for frame `k`: animated layers get `seed + k * stride`,
/// everything else is cloned as-is.  The input list is never modified.
pub fn layers_for_frame(layers: &[Layer], frame: usize, stride: f32) -> Vec<Layer> {
    layers
        .iter()
        .map(|layer| {
            let mut l = layer.clone();
            if let (true, Some(base)) = (layer.is_animated(), layer.seed) {
                l.seed = Some(base + frame as f32 * stride);
            }
            l
        })
        .collect()
}

/// Clears the busy flag when the run ends, however it ends.
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// ============================================================================
// EXPORTER
// ============================================================================

pub struct BatchExporter {
    settings: BatchSettings,
    busy: AtomicBool,
    cancel: Arc<AtomicBool>,
}

impl BatchExporter {
    pub fn new(settings: BatchSettings) -> Self {
        Self {
            settings: BatchSettings { chunk_size: settings.chunk_size.max(1), ..settings },
            busy: AtomicBool::new(false),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn settings(&self) -> BatchSettings {
        self.settings
    }

    pub fn is_running(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Flag checked between frames.  Setting it stops the current run.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Export every frame of `source` through `layers`.
    pub fn run(
        &self,
        renderer: &mut dyn FrameRenderer,
        source: &mut dyn FrameSource,
        layers: &[Layer],
        sink: &mut dyn ChunkSink,
    ) -> Result<BatchOutcome, ExportError> {
        let Some(_guard) = BusyGuard::acquire(&self.busy) else {
            tracing::warn!("export requested while another is running; ignored");
            return Ok(BatchOutcome::AlreadyRunning);
        };
        self.cancel.store(false, Ordering::SeqCst);

        let total = source.len();
        let chunk_size = self.settings.chunk_size;
        let total_chunks = total.div_ceil(chunk_size).max(1);
        let mut report = BatchReport { batch_id: Uuid::new_v4(), ..Default::default() };
        tracing::info!(batch = %report.batch_id, frames = total, chunks = total_chunks, "batch export started");

        let mut pending: Vec<(usize, RgbaImage)> = Vec::with_capacity(chunk_size);
        let mut chunk_index = 0;
        for index in 0..total {
            if self.cancel.load(Ordering::SeqCst) {
                report.cancelled = true;
                tracing::info!(batch = %report.batch_id, at_frame = index, "batch export cancelled");
                break;
            }

            match self.render_one(renderer, source, layers, index) {
                Ok(frame) => pending.push((index, frame)),
                Err(FrameFailure::Abort(e)) => return Err(ExportError::Engine(e)),
                Err(FrameFailure::Skip(msg)) => {
                    tracing::warn!(frame = index, source = %source.label(index), "frame skipped: {msg}");
                    report.failed.push((index, msg));
                }
            }

            let chunk_done = (index + 1) % chunk_size == 0 && index + 1 < total;
            if chunk_done {
                self.flush(&mut pending, &mut report, sink, chunk_index, total_chunks, false)?;
                chunk_index += 1;
            }
        }

        // Whatever is left (or nothing at all) goes out as the final chunk.
        let total_chunks = if report.cancelled { chunk_index + 1 } else { total_chunks };
        self.flush(&mut pending, &mut report, sink, chunk_index, total_chunks, true)?;

        tracing::info!(
            batch = %report.batch_id,
            rendered = report.rendered,
            failed = report.failed.len(),
            cancelled = report.cancelled,
            "batch export finished"
        );
        Ok(BatchOutcome::Completed(report))
    }

    fn render_one(
        &self,
        renderer: &mut dyn FrameRenderer,
        source: &mut dyn FrameSource,
        layers: &[Layer],
        index: usize,
    ) -> Result<RgbaImage, FrameFailure> {
        let image = source.fetch(index).map_err(|e| FrameFailure::Skip(format!("fetch failed: {e}")))?;
        let frame_layers = layers_for_frame(layers, index, self.settings.seed_stride);
        renderer.render_frame(&image, &frame_layers).map_err(|e| match e {
            EngineError::DeviceLost(_) => FrameFailure::Abort(e),
            other => FrameFailure::Skip(format!("render failed: {other}")),
        })
    }

    fn flush(
        &self,
        pending: &mut Vec<(usize, RgbaImage)>,
        report: &mut BatchReport,
        sink: &mut dyn ChunkSink,
        chunk_index: usize,
        total_chunks: usize,
        is_final: bool,
    ) -> Result<(), ExportError> {
        let encoded: Vec<(usize, FxResult<Vec<u8>>)> = std::mem::take(pending)
            .into_par_iter()
            .map(|(index, frame)| (index, crate::io::encode_png(&frame)))
            .collect();

        let mut frames = Vec::with_capacity(encoded.len());
        for (frame_index, result) in encoded {
            match result {
                Ok(png) => frames.push(EncodedFrame { frame_index, png }),
                Err(e) => {
                    tracing::warn!(frame = frame_index, "PNG encode failed: {e}");
                    report.failed.push((frame_index, format!("encode failed: {e}")));
                }
            }
        }
        report.rendered += frames.len();

        let chunk = ExportChunk { batch_id: report.batch_id, chunk_index, total_chunks, is_final, frames };
        sink.deliver(chunk).map_err(ExportError::Sink)?;
        report.chunks_delivered += 1;
        Ok(())
    }
}

enum FrameFailure {
    Skip(String),
    Abort(EngineError),
}

// ============================================================================
// DIRECTORY SINK
// ============================================================================

#[derive(Serialize)]
struct ChunkManifest<'a> {
    batch_id: Uuid,
    chunk_index: usize,
    total_chunks: usize,
    is_final: bool,
    frames: Vec<ManifestFrame<'a>>,
}

#[derive(Serialize)]
struct ManifestFrame<'a> {
    frame_index: usize,
    file: &'a str,
}

/// Writes `frame_NNNNN.png` per frame and `chunk_NNNN.json` per chunk.
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn frame_file_name(frame_index: usize) -> String {
        format!("frame_{:05}.png", frame_index)
    }
}

impl ChunkSink for DirectorySink {
    fn deliver(&mut self, chunk: ExportChunk) -> Result<(), String> {
        std::fs::create_dir_all(&self.dir).map_err(|e| format!("{}: {}", self.dir.display(), e))?;
        let names: Vec<String> = chunk.frames.iter().map(|f| Self::frame_file_name(f.frame_index)).collect();
        for (frame, name) in chunk.frames.iter().zip(&names) {
            let path = self.dir.join(name);
            std::fs::write(&path, &frame.png).map_err(|e| format!("{}: {}", path.display(), e))?;
        }
        let manifest = ChunkManifest {
            batch_id: chunk.batch_id,
            chunk_index: chunk.chunk_index,
            total_chunks: chunk.total_chunks,
            is_final: chunk.is_final,
            frames: chunk
                .frames
                .iter()
                .zip(&names)
                .map(|(f, name)| ManifestFrame { frame_index: f.frame_index, file: name })
                .collect(),
        };
        let json = serde_json::to_string_pretty(&manifest).map_err(|e| e.to_string())?;
        let path = self.dir.join(format!("chunk_{:04}.json", chunk.chunk_index));
        std::fs::write(&path, json).map_err(|e| format!("{}: {}", path.display(), e))?;
        tracing::debug!(chunk = chunk.chunk_index, frames = names.len(), "chunk written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::layers::LayerId;
    use crate::effects::{EffectId, ParamMap, ParamValue};
    use crate::error::FxError;

    fn animated_grain(seed: f32) -> Layer {
        let mut params = ParamMap::new();
        params.insert("amount".into(), ParamValue::Number(0.1));
        params.insert("animate".into(), ParamValue::Bool(true));
        Layer {
            id: LayerId(1),
            effect: EffectId::new("grain"),
            enabled: true,
            opacity: 1.0,
            params,
            seed: Some(seed),
        }
    }

    fn still_layer() -> Layer {
        Layer {
            id: LayerId(2),
            effect: EffectId::new("invert"),
            enabled: true,
            opacity: 1.0,
            params: ParamMap::new(),
            seed: Some(5.0),
        }
    }

    /// `None` entries fail to fetch.
    struct FakeFrames(Vec<Option<RgbaImage>>);

    impl FrameSource for FakeFrames {
        fn len(&self) -> usize {
            self.0.len()
        }

        fn fetch(&mut self, index: usize) -> FxResult<RgbaImage> {
            self.0[index].clone().ok_or_else(|| FxError::manifest("missing"))
        }
    }

    fn frames(n: usize) -> FakeFrames {
        FakeFrames((0..n).map(|i| Some(RgbaImage::from_pixel(2 + i as u32, 2, image::Rgba([i as u8, 0, 0, 255])))).collect())
    }

    #[derive(Default)]
    struct FakeRenderer {
        seeds: Vec<Vec<Option<f32>>>,
        fail_at: Option<(usize, EngineError)>,
        cancel_after: Option<(usize, Arc<AtomicBool>)>,
    }

    impl FrameRenderer for FakeRenderer {
        fn render_frame(&mut self, image: &RgbaImage, layers: &[Layer]) -> EngineResult<RgbaImage> {
            let call = self.seeds.len();
            self.seeds.push(layers.iter().map(|l| l.seed).collect());
            if let Some((n, flag)) = &self.cancel_after {
                if call + 1 == *n {
                    flag.store(true, Ordering::SeqCst);
                }
            }
            match self.fail_at.take() {
                Some((n, err)) if n == call => Err(err),
                other => {
                    self.fail_at = other;
                    Ok(image.clone())
                }
            }
        }
    }

    #[derive(Default)]
    struct MemorySink(Vec<ExportChunk>);

    impl ChunkSink for MemorySink {
        fn deliver(&mut self, chunk: ExportChunk) -> Result<(), String> {
            self.0.push(chunk);
            Ok(())
        }
    }

    fn completed(outcome: BatchOutcome) -> BatchReport {
        match outcome {
            BatchOutcome::Completed(r) => r,
            BatchOutcome::AlreadyRunning => panic!("export did not run"),
        }
    }

    #[test]
    fn animated_seeds_follow_the_stride_and_live_seeds_are_untouched() {
        let exporter = BatchExporter::new(BatchSettings { chunk_size: 8, seed_stride: 2.5 });
        let layers = vec![animated_grain(10.0), still_layer()];
        let before = layers.clone();
        let mut renderer = FakeRenderer::default();
        let mut sink = MemorySink::default();

        let report = completed(exporter.run(&mut renderer, &mut frames(4), &layers, &mut sink).unwrap());
        assert_eq!(report.rendered, 4);
        let animated: Vec<f32> = renderer.seeds.iter().map(|s| s[0].unwrap()).collect();
        assert_eq!(animated, vec![10.0, 12.5, 15.0, 17.5]);
        assert!(renderer.seeds.iter().all(|s| s[1] == Some(5.0)));
        assert_eq!(layers, before);
    }

    #[test]
    fn chunks_are_bounded_and_tagged() {
        let exporter = BatchExporter::new(BatchSettings { chunk_size: 2, seed_stride: 1.0 });
        let mut sink = MemorySink::default();
        let report = completed(
            exporter
                .run(&mut FakeRenderer::default(), &mut frames(5), &[], &mut sink)
                .unwrap(),
        );
        assert_eq!(report.chunks_delivered, 3);
        let shape: Vec<(usize, usize, bool, Vec<usize>)> = sink
            .0
            .iter()
            .map(|c| (c.chunk_index, c.total_chunks, c.is_final, c.frames.iter().map(|f| f.frame_index).collect()))
            .collect();
        assert_eq!(
            shape,
            vec![
                (0, 3, false, vec![0, 1]),
                (1, 3, false, vec![2, 3]),
                (2, 3, true, vec![4]),
            ]
        );
        assert!(sink.0.iter().all(|c| c.batch_id == report.batch_id));
        assert_eq!(&sink.0[0].frames[0].png[1..4], b"PNG");
    }

    #[test]
    fn failed_frames_are_skipped_not_fatal() {
        let exporter = BatchExporter::new(BatchSettings::default());
        let mut source = frames(4);
        source.0[1] = None;
        let mut renderer = FakeRenderer { fail_at: Some((2, EngineError::EmptyImage)), ..Default::default() };
        let mut sink = MemorySink::default();

        let report = completed(exporter.run(&mut renderer, &mut source, &[], &mut sink).unwrap());
        assert_eq!(report.rendered, 2);
        let failed: Vec<usize> = report.failed.iter().map(|(i, _)| *i).collect();
        assert_eq!(failed, vec![1, 3]);
        assert_eq!(sink.0.len(), 1);
        assert!(sink.0[0].is_final);
    }

    #[test]
    fn device_loss_aborts_the_run() {
        let exporter = BatchExporter::new(BatchSettings::default());
        let mut renderer = FakeRenderer { fail_at: Some((1, EngineError::DeviceLost("gone".into()))), ..Default::default() };
        let result = exporter.run(&mut renderer, &mut frames(3), &[], &mut MemorySink::default());
        assert!(matches!(result, Err(ExportError::Engine(EngineError::DeviceLost(_)))));
        assert!(!exporter.is_running());
    }

    #[test]
    fn cancellation_is_honoured_between_frames() {
        let exporter = BatchExporter::new(BatchSettings { chunk_size: 10, seed_stride: 1.0 });
        let mut renderer = FakeRenderer { cancel_after: Some((2, exporter.cancel_handle())), ..Default::default() };
        let mut sink = MemorySink::default();

        let report = completed(exporter.run(&mut renderer, &mut frames(6), &[], &mut sink).unwrap());
        assert!(report.cancelled);
        assert_eq!(report.rendered, 2);
        assert_eq!(sink.0.len(), 1);
        assert!(sink.0[0].is_final);
        assert_eq!(sink.0[0].total_chunks, 1);
    }

    #[test]
    fn second_export_while_busy_is_ignored() {
        let exporter = BatchExporter::new(BatchSettings::default());
        let guard = BusyGuard::acquire(&exporter.busy).unwrap();
        let mut renderer = FakeRenderer::default();
        let outcome = exporter.run(&mut renderer, &mut frames(2), &[], &mut MemorySink::default()).unwrap();
        assert!(matches!(outcome, BatchOutcome::AlreadyRunning));
        assert!(renderer.seeds.is_empty());
        drop(guard);
        assert!(!exporter.is_running());
    }

    #[test]
    fn empty_batch_still_finalises() {
        let exporter = BatchExporter::new(BatchSettings::default());
        let mut sink = MemorySink::default();
        completed(exporter.run(&mut FakeRenderer::default(), &mut frames(0), &[], &mut sink).unwrap());
        assert_eq!(sink.0.len(), 1);
        assert!(sink.0[0].is_final && sink.0[0].frames.is_empty());
    }

    #[test]
    fn directory_sink_writes_frames_and_manifest() {
        let dir = std::env::temp_dir().join(format!("shaderstack-batch-{}", uuid::Uuid::new_v4()));
        let exporter = BatchExporter::new(BatchSettings { chunk_size: 2, seed_stride: 1.0 });
        let mut sink = DirectorySink::new(&dir);
        completed(exporter.run(&mut FakeRenderer::default(), &mut frames(3), &[], &mut sink).unwrap());

        assert!(dir.join("frame_00000.png").is_file());
        assert!(dir.join("frame_00002.png").is_file());
        let manifest: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.join("chunk_0001.json")).unwrap()).unwrap();
        assert_eq!(manifest["is_final"], true);
        assert_eq!(manifest["total_chunks"], 2);
        assert_eq!(manifest["frames"][0]["file"], "frame_00002.png");
        std::fs::remove_dir_all(&dir).ok();
    }
}
