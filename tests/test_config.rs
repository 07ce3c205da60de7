mod common;

use approx::assert_abs_diff_eq;
use common::*;
use shoremap::ShoreError;
use shoremap::config::{load_gcp_picks, load_transects};

#[test]
fn test_site_parses_with_defaults() -> anyhow::Result<()> {
    let site = test_site();

    assert_eq!(site.name, "synthetic-beach");
    assert_eq!(site.gcps.len(), 6);
    assert_eq!(site.origin(), ORIGIN);
    assert_abs_diff_eq!(site.nominal_angles()[1], 78f64.to_radians(), epsilon = 1e-12);
    assert_eq!(site.extraction.blur_radius, 5);
    assert_eq!(site.registration.max_keypoints, 2048);

    let local = site.to_local(&site.gcps[0]);
    assert_abs_diff_eq!(local.x, -20.0, epsilon = 1e-9);
    assert_abs_diff_eq!(local.y, 70.0, epsilon = 1e-9);

    let grid = WorldGrid::from_site(&site);
    assert_eq!(grid.cols(), 161);
    assert_eq!(grid.rows(), 201);
    assert_eq!(grid.world_at(0, 0), [-40.0, 60.0]);
    Ok(())
}

#[test]
fn test_extraction_overrides() -> anyhow::Result<()> {
    let text = format!(
        "{}\n[extraction]\nblack_test_distance = 3.5\ndry_gradient_threshold = 8.0\n",
        site_toml()
    );
    let site = SiteCalibration::from_toml_str(&text)?;
    assert_eq!(site.extraction.black_test_distance, 3.5);
    assert_eq!(site.extraction.dry_gradient_threshold, 8.0);
    assert_eq!(site.extraction.perpendicular_tolerance, 1.0);
    Ok(())
}

fn expect_invalid(text: &str) {
    match SiteCalibration::from_toml_str(text) {
        Err(ShoreError::InvalidConfig(_)) => {}
        other => panic!("expected InvalidConfig, got {:?}", other.map(|s| s.name)),
    }
}

#[test]
fn test_invalid_sites_are_rejected() {
    expect_invalid(&site_toml().replace("dxdy = 0.5", "dxdy = 0.0"));
    expect_invalid(&site_toml().replace("xlim = [-40.0, 40.0]", "xlim = [40.0, -40.0]"));
    expect_invalid(&site_toml().replace("hfov = [50.0, 62.0]", "hfov = [62.0, 50.0]"));
    expect_invalid(&site_toml().replace("name = \"far\"", "name = \"post\""));
    expect_invalid(&format!("{}\n[camera_extra]\nfoo = 1\n", site_toml()));

    // Only the first three GCP tables survive
    let text = site_toml();
    let cut = text.match_indices("[[gcp]]").nth(3).map(|(i, _)| i).unwrap();
    expect_invalid(&text[..cut]);
}

#[test]
fn test_exclusion_zones_are_local() -> anyhow::Result<()> {
    assert!(test_site().exclusions.is_empty());

    let text = format!("{}{}", site_toml(), exclusion_toml("pier", -32.0, -28.0));
    let site = SiteCalibration::from_toml_str(&text)?;
    assert_eq!(site.exclusions.len(), 1);
    assert_eq!(site.exclusions[0].name, "pier");

    let polygons = site.exclusion_polygons();
    assert_eq!(polygons[0].len(), 4);
    assert_abs_diff_eq!(polygons[0][0][0], -32.0, epsilon = 1e-9);
    assert_abs_diff_eq!(polygons[0][2][1], 160.0, epsilon = 1e-9);
    Ok(())
}

#[test]
fn test_exclusion_zone_needs_three_points() {
    let text = format!(
        "{}\n[[exclusion]]\nname = \"line\"\npoints = [[990.0, 5070.0], [1010.0, 5070.0]]\n",
        site_toml()
    );
    expect_invalid(&text);
}

#[test]
fn test_picks_join_by_name_and_skip_unset() -> anyhow::Result<()> {
    let site = test_site();
    let mut picks = gcp_picks(&true_pose());
    picks[5].v = None;

    let gcps = site.correspondences(&picks)?;
    assert_eq!(gcps.len(), 5);
    assert_abs_diff_eq!(gcps[4].world.z, 2.0, epsilon = 1e-12);
    Ok(())
}

#[test]
fn test_too_few_picks() {
    let site = test_site();
    let mut picks = gcp_picks(&true_pose());
    for pick in picks.iter_mut().skip(3) {
        pick.u = None;
    }

    match site.correspondences(&picks) {
        Err(ShoreError::InsufficientCorrespondences { needed, found }) => {
            assert_eq!(needed, 4);
            assert_eq!(found, 3);
        }
        other => panic!("expected InsufficientCorrespondences, got {:?}", other.map(|g| g.len())),
    }
}

#[test]
fn test_unknown_pick_name() {
    let site = test_site();
    let mut picks = gcp_picks(&true_pose());
    picks[0].name = "nowhere".to_string();
    assert!(matches!(
        site.correspondences(&picks),
        Err(ShoreError::InvalidConfig(_))
    ));
}

#[test]
fn test_missing_inputs_are_reported() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;

    assert!(matches!(
        SiteCalibration::load(dir.path().join("site.toml")),
        Err(ShoreError::MissingInput { what: "site configuration", .. })
    ));
    assert!(matches!(
        load_gcp_picks(dir.path().join("gcp_picks.json")),
        Err(ShoreError::MissingInput { .. })
    ));

    let empty = dir.path().join("transects.json");
    std::fs::write(&empty, "[]")?;
    assert!(matches!(load_transects(&empty), Err(ShoreError::MissingInput { .. })));
    Ok(())
}

#[test]
fn test_transects_load() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let path = dir.path().join("transects.json");
    std::fs::write(&path, serde_json::to_string(&test_transects())?)?;

    let transects = load_transects(&path)?;
    assert_eq!(transects.len(), 7);
    assert_abs_diff_eq!(transects[0].length(), 80.0, epsilon = 1e-12);
    Ok(())
}
