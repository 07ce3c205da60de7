use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::RgbImage;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tif", "tiff"];

/// Paths of everything a site run reads and writes.
#[derive(Debug, Clone)]
pub struct SiteLayout {
    root: PathBuf,
}

impl SiteLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn site_config(&self) -> PathBuf {
        self.root.join("site.toml")
    }

    pub fn control_dir(&self) -> PathBuf {
        self.root.join("control")
    }

    /// The control photo, whichever supported extension it was saved with.
    pub fn control_photo(&self) -> Option<PathBuf> {
        ["png", "jpg", "jpeg"]
            .iter()
            .map(|ext| self.control_dir().join(format!("control.{}", ext)))
            .find(|p| p.exists())
    }

    pub fn control_mask(&self) -> PathBuf {
        self.control_dir().join("mask.png")
    }

    pub fn gcp_picks(&self) -> PathBuf {
        self.control_dir().join("gcp_picks.json")
    }

    /// Optional plan-view mask, same size as the world grid; zero cells are ignored.
    pub fn exclusion_mask(&self) -> PathBuf {
        self.root.join("exclusion.png")
    }

    pub fn transects(&self) -> PathBuf {
        self.root.join("transects.json")
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.root.join("raw")
    }

    pub fn aligned_dir(&self) -> PathBuf {
        self.root.join("aligned")
    }

    pub fn rectified_dir(&self) -> PathBuf {
        self.root.join("rectified")
    }

    pub fn shorelines_dir(&self) -> PathBuf {
        self.root.join("shorelines")
    }

    pub fn overlays_dir(&self) -> PathBuf {
        self.root.join("overlays")
    }

    pub fn pose_record(&self) -> PathBuf {
        self.rectified_dir().join("pose_record.json")
    }

    pub fn aligned_path(&self, stem: &str) -> PathBuf {
        self.aligned_dir().join(format!("aligned_{}.png", stem))
    }

    pub fn rectified_path(&self, stem: &str) -> PathBuf {
        self.rectified_dir().join(format!("rectified_{}.png", stem))
    }

    pub fn shoreline_path(&self, stem: &str) -> PathBuf {
        self.shorelines_dir().join(format!("shoreline_{}.json", stem))
    }

    pub fn raster_overlay_path(&self, stem: &str) -> PathBuf {
        self.overlays_dir().join(format!("plan_{}.png", stem))
    }

    pub fn photo_overlay_path(&self, stem: &str) -> PathBuf {
        self.overlays_dir().join(format!("photo_{}.png", stem))
    }

    pub fn ensure_output_dirs(&self) -> Result<()> {
        for dir in [
            self.aligned_dir(),
            self.rectified_dir(),
            self.shorelines_dir(),
            self.overlays_dir(),
        ] {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        Ok(())
    }

    pub fn raw_photos(&self) -> Result<Vec<PathBuf>> {
        list_images(&self.raw_dir())
    }

    /// Aligned photos as `(stem, path)`.
    pub fn aligned_photos(&self) -> Result<Vec<(String, PathBuf)>> {
        with_prefix(&self.aligned_dir(), "aligned_")
    }

    /// Rectified rasters as `(stem, path)`.
    pub fn rectified_rasters(&self) -> Result<Vec<(String, PathBuf)>> {
        with_prefix(&self.rectified_dir(), "rectified_")
    }

    pub fn status(&self) -> Result<SetupStatus> {
        let count = |dir: PathBuf| list_images(&dir).map(|v| v.len());
        Ok(SetupStatus {
            site_config: self.site_config().exists(),
            control_photo: self.control_photo().is_some(),
            mask: self.control_mask().exists(),
            gcp_picks: self.gcp_picks().exists(),
            transects: self.transects().exists(),
            pose_record: self.pose_record().exists(),
            raw_photos: count(self.raw_dir())?,
            aligned_photos: count(self.aligned_dir())?,
            rectified_rasters: count(self.rectified_dir())?,
            shoreline_records: list_files(&self.shorelines_dir(), &["json"])?.len(),
        })
    }
}

/// Which inputs a site has and how far processing has got.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupStatus {
    pub site_config: bool,
    pub control_photo: bool,
    pub mask: bool,
    pub gcp_picks: bool,
    pub transects: bool,
    pub pose_record: bool,
    pub raw_photos: usize,
    pub aligned_photos: usize,
    pub rectified_rasters: usize,
    pub shoreline_records: usize,
}

impl SetupStatus {
    /// Names of required inputs that are absent.
    pub fn missing(&self) -> Vec<&'static str> {
        [
            (self.site_config, "site configuration"),
            (self.control_photo, "control photo"),
            (self.mask, "mask"),
            (self.gcp_picks, "GCP picks"),
            (self.transects, "transects"),
        ]
        .into_iter()
        .filter(|(present, _)| !present)
        .map(|(_, name)| name)
        .collect()
    }

    pub fn is_ready(&self) -> bool {
        self.missing().is_empty()
    }
}

impl fmt::Display for SetupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = |ok: bool| if ok { "ok" } else { "missing" };
        writeln!(f, "site.toml:       {}", mark(self.site_config))?;
        writeln!(f, "control photo:   {}", mark(self.control_photo))?;
        writeln!(f, "mask:            {}", mark(self.mask))?;
        writeln!(f, "GCP picks:       {}", mark(self.gcp_picks))?;
        writeln!(f, "transects:       {}", mark(self.transects))?;
        writeln!(f, "pose record:     {}", mark(self.pose_record))?;
        writeln!(f, "raw photos:      {}", self.raw_photos)?;
        writeln!(f, "aligned:         {}", self.aligned_photos)?;
        writeln!(f, "rectified:       {}", self.rectified_rasters)?;
        write!(f, "shorelines:      {}", self.shoreline_records)
    }
}

fn list_files(dir: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))? {
        let path = entry?.path();
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_none_or(|n| n.starts_with('.'));
        let wanted = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| extensions.contains(&e.to_ascii_lowercase().as_str()));
        if path.is_file() && !hidden && wanted {
            files.push(path);
        }
    }
    files.sort_by(|a, b| natural_cmp(&file_name(a), &file_name(b)));
    Ok(files)
}

/// Image files in `dir`, in natural order. A missing directory is empty.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    list_files(dir, IMAGE_EXTENSIONS)
}

fn with_prefix(dir: &Path, prefix: &str) -> Result<Vec<(String, PathBuf)>> {
    Ok(list_images(dir)?
        .into_iter()
        .filter_map(|p| {
            let stem = p.file_stem()?.to_str()?.strip_prefix(prefix)?.to_string();
            Some((stem, p))
        })
        .collect())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Output stem for a raw photo: file stem without a leading `NNNN-` counter.
pub fn clean_stem(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    match stem.split_once('-') {
        Some((prefix, rest))
            if !prefix.is_empty() && !rest.is_empty() && prefix.bytes().all(|b| b.is_ascii_digit()) =>
        {
            rest.to_string()
        }
        _ => stem,
    }
}

/// Human ordering: digit runs compare by value, text case-insensitively.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (ca, cb) = (chunks(a), chunks(b));
    for (x, y) in ca.iter().zip(cb.iter()) {
        let ord = match (x, y) {
            (Chunk::Number(x), Chunk::Number(y)) => {
                let (x, y) = (x.trim_start_matches('0'), y.trim_start_matches('0'));
                x.len().cmp(&y.len()).then_with(|| x.cmp(y))
            }
            (Chunk::Text(x), Chunk::Text(y)) => x.to_lowercase().cmp(&y.to_lowercase()),
            (Chunk::Number(_), Chunk::Text(_)) => Ordering::Less,
            (Chunk::Text(_), Chunk::Number(_)) => Ordering::Greater,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    ca.len().cmp(&cb.len()).then_with(|| a.cmp(b))
}

enum Chunk<'a> {
    Number(&'a str),
    Text(&'a str),
}

fn chunks(s: &str) -> Vec<Chunk<'_>> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut digits: Option<bool> = None;
    for (i, ch) in s.char_indices() {
        let d = ch.is_ascii_digit();
        if digits.is_some_and(|prev| prev != d) {
            out.push(chunk(&s[start..i], !d));
            start = i;
        }
        digits = Some(d);
    }
    if let Some(d) = digits {
        out.push(chunk(&s[start..], d));
    }
    out
}

fn chunk(s: &str, digits: bool) -> Chunk<'_> {
    if digits { Chunk::Number(s) } else { Chunk::Text(s) }
}

/// Write `path` through a sibling temp file and a rename.
///
/// Returns `Ok(false)` without touching anything if `path` already exists.
pub fn write_once<F>(path: &Path, write: F) -> Result<bool>
where
    F: FnOnce(&Path) -> Result<()>,
{
    if path.exists() {
        return Ok(false);
    }
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let tmp = dir.join(format!(".tmp-{}", file_name(path)));

    if let Err(e) = write(&tmp) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e);
    }
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move output into place: {}", path.display()))?;
    Ok(true)
}

pub fn load_photo(path: &Path) -> Result<RgbImage> {
    let img = image::open(path).with_context(|| format!("Failed to decode image {}", path.display()))?;
    Ok(img.to_rgb8())
}

pub fn save_png(image: &RgbImage, path: &Path) -> Result<()> {
    image
        .save_with_format(path, image::ImageFormat::Png)
        .with_context(|| format!("Failed to save {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn natural_order_compares_numbers_by_value() {
        let mut names = vec!["img10.png", "img2.png", "IMG1.png", "img02b.png"];
        names.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(names, vec!["IMG1.png", "img2.png", "img02b.png", "img10.png"]);
    }

    #[test]
    fn counter_prefix_is_stripped() {
        assert_eq!(clean_stem(Path::new("raw/0007-beach_0800.jpg")), "beach_0800");
        assert_eq!(clean_stem(Path::new("raw/beach-0800.jpg")), "beach-0800");
        assert_eq!(clean_stem(Path::new("raw/2024.jpg")), "2024");
    }
}
