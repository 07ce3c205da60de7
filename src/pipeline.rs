use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use image::RgbImage;
use log::warn;

use crate::config::{self, SiteCalibration};
use crate::error::ShoreError;
use crate::models::{ShiftSummary, ShorelineFix, ShorelineRecord};
use crate::overlay;
use crate::raster::{self, RectifiedRaster};
use crate::rectification::{PoseRecord, PoseSolver, Rectifier};
use crate::registration::{self, AlignOutcome, ControlAligner, Correspondences, SkipReason};
use crate::shoreline::ShorelineExtractor;
use crate::store::{self, SiteLayout};

/// Debug configuration for pipeline execution
#[derive(Clone, Debug)]
pub struct DebugConfig {
    /// Root directory for debug outputs
    pub output_dir: PathBuf,
    pub enabled: bool,
}

/// Context shared by every stage of a run
#[derive(Clone, Debug, Default)]
pub struct PipelineContext {
    pub verbose: bool,
    pub debug: Option<DebugConfig>,
}

impl PipelineContext {
    /// Save an intermediate image under `<debug>/<NN>_<stage>/<name>.png`
    fn save_debug(&self, step: usize, stage: &str, name: &str, image: &RgbImage) -> Result<()> {
        let Some(debug_config) = &self.debug else {
            return Ok(());
        };
        if !debug_config.enabled {
            return Ok(());
        }

        let step_dir_name = format!("{:02}_{}", step, stage);
        let step_dir = debug_config.output_dir.join(&step_dir_name);
        std::fs::create_dir_all(&step_dir)?;
        let filename = format!("{}.png", name);
        store::save_png(image, &step_dir.join(&filename))?;

        if self.verbose {
            println!("  Debug: saved {}/{}", step_dir_name, filename);
        }
        Ok(())
    }
}

/// Cooperative stop signal, checked between photos.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome counts for one site run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub aligned: usize,
    pub skipped: Vec<(String, SkipReason)>,
    /// Outputs that already existed and were left alone, per stage.
    pub already_aligned: usize,
    pub already_rectified: usize,
    pub already_extracted: usize,
    pub failed: Vec<(String, String)>,
    pub rectified: usize,
    pub extracted: usize,
    pub undefined_fixes: usize,
    pub shift: ShiftSummary,
    pub cancelled: bool,
}

impl RunReport {
    pub fn print_summary(&self) {
        println!("\n=== Site Run Summary ===");
        println!("Aligned:    {}", self.aligned);
        println!("Skipped:    {}", self.skipped.len());
        println!(
            "Existing:   {} aligned, {} rectified, {} shorelines",
            self.already_aligned, self.already_rectified, self.already_extracted
        );
        println!("Failed:     {}", self.failed.len());
        println!("Rectified:  {}", self.rectified);
        println!("Shorelines: {} ({} undefined transect fixes)", self.extracted, self.undefined_fixes);
        match (self.shift.mean, self.shift.max) {
            (Some(mean), Some(max)) => println!(
                "Wet/dry shift: {} transects, mean {:.2}, max {:.2}",
                self.shift.count, mean, max
            ),
            _ => println!("Wet/dry shift: no transects with both boundaries"),
        }
        if self.cancelled {
            println!("Run was cancelled before completion.");
        }
    }
}

/// Align, solve, rectify and extract shorelines for one site directory
pub struct SiteRun {
    layout: SiteLayout,
    context: PipelineContext,
    cancel: CancelToken,
    approved: bool,
    skip_shoreline: bool,
}

impl SiteRun {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            layout: SiteLayout::new(root),
            context: PipelineContext::default(),
            cancel: CancelToken::new(),
            approved: false,
            skip_shoreline: false,
        }
    }

    /// Enable verbose output
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.context.verbose = verbose;
        self
    }

    /// Enable debug mode with output directory
    /// The directory must be empty or non-existent
    pub fn with_debug(mut self, output_dir: PathBuf) -> Result<Self> {
        if output_dir.exists() {
            let entries = std::fs::read_dir(&output_dir)?;
            if entries.count() > 0 {
                anyhow::bail!("Debug directory is not empty: {}", output_dir.display());
            }
        } else {
            std::fs::create_dir_all(&output_dir)?;
        }

        self.context.debug = Some(DebugConfig {
            output_dir,
            enabled: true,
        });
        Ok(self)
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Default `approved` flag written into shoreline records
    pub fn with_approved(mut self, approved: bool) -> Self {
        self.approved = approved;
        self
    }

    pub fn with_skip_shoreline(mut self, skip: bool) -> Self {
        self.skip_shoreline = skip;
        self
    }

    pub fn layout(&self) -> &SiteLayout {
        &self.layout
    }

    pub fn load_site(&self) -> Result<SiteCalibration> {
        let path = self.layout.site_config();
        SiteCalibration::load(&path).with_context(|| format!("Failed to load {}", path.display()))
    }

    fn control_path(&self) -> Result<PathBuf> {
        self.layout
            .control_photo()
            .ok_or_else(|| ShoreError::missing("control photo", self.layout.control_dir().join("control.png")).into())
    }

    fn should_stop(&self, report: &mut RunReport) -> bool {
        if self.cancel.is_cancelled() {
            report.cancelled = true;
            warn!("Run cancelled, stopping between photos");
        }
        report.cancelled
    }

    /// Run every stage in order.
    pub fn run(&self) -> Result<RunReport> {
        let status = self.layout.status()?;
        if !status.is_ready() {
            anyhow::bail!(
                "Site {} is missing: {}",
                self.layout.root().display(),
                status.missing().join(", ")
            );
        }
        self.layout.ensure_output_dirs()?;

        let site = self.load_site()?;
        let mut report = RunReport::default();

        self.align(&site, &mut report)?;
        if report.cancelled {
            return Ok(report);
        }

        let record = self.solve(&site)?;
        self.rectify(&record, &mut report)?;
        if report.cancelled || self.skip_shoreline {
            return Ok(report);
        }

        self.extract(&site, &record, &mut report)?;
        Ok(report)
    }

    /// Two-pass alignment of every raw photo to the control photo.
    pub fn align(&self, site: &SiteCalibration, report: &mut RunReport) -> Result<()> {
        let control_path = self.control_path()?;
        let control = store::load_photo(&control_path)?;
        let mask = raster::load_mask(self.layout.control_mask())?;
        let aligner = ControlAligner::new(&control, Some(mask), &site.registration)?;

        // Pass 1: match counts for every raw photo. Already aligned photos
        // still count towards the batch threshold.
        let mut counts = Vec::new();
        let mut pending: Vec<(String, PathBuf, Correspondences)> = Vec::new();
        for path in self.layout.raw_photos()? {
            if self.should_stop(report) {
                return Ok(());
            }
            let stem = store::clean_stem(&path);
            let photo = match store::load_photo(&path) {
                Ok(photo) => photo,
                Err(e) => {
                    warn!("Skipping {}: {:#}", path.display(), e);
                    report.failed.push((stem, format!("{:#}", e)));
                    continue;
                }
            };
            let pairs = aligner.correspondences(&photo);
            if self.context.verbose {
                println!("  {}: {} matches", stem, pairs.len());
            }
            counts.push(pairs.len());
            if self.layout.aligned_path(&stem).exists() {
                report.already_aligned += 1;
                continue;
            }
            pending.push((stem, path, pairs));
        }

        let threshold = registration::quality_threshold(&counts);
        if self.context.verbose {
            if let Some(t) = threshold {
                println!("Match threshold for this batch: {:.1}", t);
            }
        }

        // Pass 2: align the photos that meet the batch criteria
        for (stem, path, pairs) in pending {
            if self.should_stop(report) {
                return Ok(());
            }
            if let Some(reason) = registration::admit(pairs.len(), threshold) {
                warn!("Skipping {}: {}", stem, reason);
                report.skipped.push((stem, reason));
                continue;
            }

            let photo = store::load_photo(&path)?;
            match aligner.align_with(&photo, &pairs) {
                AlignOutcome::Aligned(aligned) => {
                    let out = self.layout.aligned_path(&stem);
                    store::write_once(&out, |tmp| store::save_png(&aligned.image, tmp))?;
                    self.context.save_debug(1, "aligned", &stem, &aligned.image)?;
                    if self.context.verbose {
                        println!(
                            "  Aligned {} ({} inliers of {})",
                            stem, aligned.inliers, aligned.matches
                        );
                    }
                    report.aligned += 1;
                }
                AlignOutcome::Skipped(reason) => {
                    warn!("Skipping {}: {}", stem, reason);
                    report.skipped.push((stem, reason));
                }
            }
        }
        Ok(())
    }

    /// Solve the pose from the control photo once; later runs reuse the stored record.
    pub fn solve(&self, site: &SiteCalibration) -> Result<PoseRecord> {
        let record_path = self.layout.pose_record();
        if record_path.exists() {
            if self.context.verbose {
                println!("Reusing pose record {}", record_path.display());
            }
            return Ok(PoseRecord::load(&record_path)?);
        }

        let control_path = self.control_path()?;
        let (width, height) = image::image_dimensions(&control_path)
            .with_context(|| format!("Failed to read {}", control_path.display()))?;
        let picks = config::load_gcp_picks(self.layout.gcp_picks())?;
        let gcps = site.correspondences(&picks)?;

        if self.context.verbose {
            println!("Solving pose from {} GCPs on a {}x{} control photo...", gcps.len(), width, height);
        }
        let solution = PoseSolver::new(site, width, height)
            .solve(&gcps)
            .context("Pose solve failed")?;

        let grid = raster::WorldGrid::from_site(site);
        let record = Rectifier::new(&solution.pose, &grid).record(site.origin());
        store::write_once(&record_path, |tmp| Ok(record.save(tmp)?))?;
        Ok(record)
    }

    /// Rectify every aligned photo that has no raster yet.
    pub fn rectify(&self, record: &PoseRecord, report: &mut RunReport) -> Result<()> {
        let pose = record.pose();
        let grid = record.grid();
        let rectifier = Rectifier::new(&pose, &grid);

        for (stem, path) in self.layout.aligned_photos()? {
            if self.should_stop(report) {
                return Ok(());
            }
            let out = self.layout.rectified_path(&stem);
            if out.exists() {
                report.already_rectified += 1;
                continue;
            }
            let photo = store::load_photo(&path)?;
            let raster = rectifier
                .rectify(&photo)
                .with_context(|| format!("Failed to rectify {}", stem))?;
            store::write_once(&out, |tmp| Ok(raster.save(tmp)?))?;
            self.context.save_debug(2, "rectified", &stem, raster.image())?;
            if self.context.verbose {
                println!("  Rectified {} ({} valid cells)", stem, raster.valid_count());
            }
            report.rectified += 1;
        }
        Ok(())
    }

    /// Extract shorelines from every rectified raster without a record.
    pub fn extract(&self, site: &SiteCalibration, record: &PoseRecord, report: &mut RunReport) -> Result<()> {
        let transects = config::load_transects(self.layout.transects())?;
        let grid = record.grid();
        let exclusion_path = self.layout.exclusion_mask();
        let file_mask = if exclusion_path.exists() {
            Some(raster::load_mask(&exclusion_path)?)
        } else {
            None
        };
        let polygons = site.exclusion_polygons();
        let zone_mask = (!polygons.is_empty()).then(|| raster::exclusion_from_polygons(&grid, &polygons));
        let exclusion = match (file_mask, zone_mask) {
            (Some(file), Some(zones)) => Some(raster::combine_masks(&file, &zones)?),
            (file, zones) => file.or(zones),
        };
        let mut extractor = ShorelineExtractor::new(&grid, &transects, &site.extraction);
        if let Some(mask) = &exclusion {
            extractor = extractor.with_exclusion(mask);
        }

        for (stem, path) in self.layout.rectified_rasters()? {
            if self.should_stop(report) {
                return Ok(());
            }
            let out = self.layout.shoreline_path(&stem);
            if out.exists() {
                report.already_extracted += 1;
                continue;
            }

            let rectified = match RectifiedRaster::load(&path) {
                Ok(rectified) => rectified,
                Err(e) if e.is_fatal_for_run() => {
                    return Err(e).with_context(|| format!("Failed to load {}", path.display()));
                }
                Err(e) => {
                    warn!("No shoreline for {}: {}", stem, e);
                    report.failed.push((stem, e.to_string()));
                    continue;
                }
            };
            let result = extractor
                .extract(&rectified)
                .with_context(|| format!("Shoreline extraction failed for {}", stem))?;

            let shoreline = ShorelineRecord::new(stem.clone(), &result, (record.origin[0], record.origin[1]), self.approved);
            store::write_once(&out, |tmp| write_json(&shoreline, tmp))?;
            self.write_overlays(&stem, &rectified, record, &result.fixes)?;

            let undefined = result.fixes.len() - result.defined_count();
            if self.context.verbose {
                println!(
                    "  {}: {}/{} transects defined",
                    stem,
                    result.defined_count(),
                    result.fixes.len()
                );
            }
            report.extracted += 1;
            report.undefined_fixes += undefined;
            report.shift = report.shift.merge(&result.summary);
        }
        Ok(())
    }

    fn write_overlays(
        &self,
        stem: &str,
        rectified: &RectifiedRaster,
        record: &PoseRecord,
        fixes: &[ShorelineFix],
    ) -> Result<()> {
        let plan = overlay::draw_on_raster(rectified, &record.grid(), fixes);
        store::write_once(&self.layout.raster_overlay_path(stem), |tmp| store::save_png(&plan, tmp))?;
        self.context.save_debug(3, "overlays", &format!("plan_{}", stem), &plan)?;

        let aligned_path = self.layout.aligned_path(stem);
        if aligned_path.exists() {
            let photo = store::load_photo(&aligned_path)?;
            let drawn = overlay::draw_on_photo(&photo, record, fixes);
            store::write_once(&self.layout.photo_overlay_path(stem), |tmp| store::save_png(&drawn, tmp))?;
            self.context.save_debug(3, "overlays", &format!("photo_{}", stem), &drawn)?;
        }
        Ok(())
    }
}

fn write_json<T: serde::Serialize>(value: &T, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}
