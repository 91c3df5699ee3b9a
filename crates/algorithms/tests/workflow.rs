//! Template, ingestion, scoring and aggregation chained in memory

use approx::assert_relative_eq;
use footprint_algorithms::prelude::*;
use footprint_core::io::read_geojson_str;
use std::collections::BTreeMap;

const CRS_MEMBER: &str = r#""crs": {"type": "name", "properties": {"name": "urn:ogc:def:crs:EPSG::32718"}}"#;

fn collection(features: &str) -> FeatureCollection {
    read_geojson_str(&format!(
        r#"{{"type": "FeatureCollection", {CRS_MEMBER}, "features": [{features}]}}"#
    ))
    .unwrap()
}

fn polygon(props: &str, x0: f64, y0: f64, x1: f64, y1: f64) -> String {
    format!(
        r#"{{"type": "Feature", "properties": {{{props}}}, "geometry": {{"type": "Polygon",
            "coordinates": [[[{x0}, {y0}], [{x1}, {y0}], [{x1}, {y1}], [{x0}, {y1}], [{x0}, {y0}]]]}}}}"#
    )
}

fn decay(d: f64) -> f64 {
    4.0 * (-d / 1000.0).exp() + 4.0
}

#[test]
fn land_use_and_roads_to_footprint() {
    // 4 x 4 km square, 1 km cells, all inside
    let boundary = collection(&polygon("", 500_000.0, 8_000_000.0, 504_000.0, 8_004_000.0));
    let params = TemplateParams {
        cell_size: 1000.0,
        crs: CRS::from_epsg(32718),
        nodata: -9999.0,
    };
    let area = build_template("square", &boundary, &params).unwrap();
    assert_eq!(area.template.shape(), (4, 4));
    assert_eq!(area.inside_count(), 16);

    // urban on the west half, crops on the north-east quarter, natural elsewhere
    let land_use = collection(&format!(
        "{}, {}",
        polygon(r#""use": "urban""#, 500_000.0, 8_000_000.0, 502_000.0, 8_004_000.0),
        polygon(r#""use": "crops""#, 502_000.0, 8_002_000.0, 504_000.0, 8_004_000.0),
    ));
    let codes = BTreeMap::from([("urban".to_string(), 2.0), ("crops".to_string(), 3.0)]);
    let land_use_method = PreparationMethod::Rasterize(RasterizeParams {
        burn: BurnValue::Attribute {
            field: "use".into(),
            codes: Some(codes),
        },
        all_touched: false,
        background: Some(1.0),
    });

    let roads = collection(
        r#"{"type": "Feature", "properties": {}, "geometry": {"type": "Point", "coordinates": [503500, 8000500]}}"#,
    );
    let roads_method = PreparationMethod::Proximity { all_touched: true };

    let scheme = ScoringScheme::new("ghf", 0.0, 10.0)
        .with_table(
            "land_use",
            ScoreTable::Categories {
                classes: vec![
                    CategoryClass { label: "natural".into(), score: 0.0, values: vec![1.0] },
                    CategoryClass { label: "urban".into(), score: 4.0, values: vec![2.0] },
                    CategoryClass { label: "crops".into(), score: 3.0, values: vec![3.0] },
                ],
            },
        )
        .with_table(
            "roads",
            ScoreTable::ExpDecay {
                max_score: 8.0,
                max_score_exp: 4.0,
                min_score_exp: 4.0,
                max_dist: 15_000.0,
                decay_scale: 1000.0,
            },
        );
    scheme.validate().unwrap();

    let id = |layer: &str| LayerIdentity::new(layer, "square", "ghf", 1000.0);
    let lu = ingest(id("land_use"), &LayerSource::Vector(land_use), None, &area, &land_use_method).unwrap();
    let rd = ingest(id("roads"), &LayerSource::Vector(roads), None, &area, &roads_method).unwrap();

    assert_eq!(lu.raster.get(0, 0).unwrap(), 2.0);
    assert_eq!(lu.raster.get(0, 3).unwrap(), 3.0);
    assert_eq!(lu.raster.get(3, 3).unwrap(), 1.0);
    assert_relative_eq!(rd.raster.get(0, 0).unwrap(), 3000.0 * 2f64.sqrt(), epsilon = 1e-9);

    let lu_scored = score_layer(&lu, &scheme, "land_use").unwrap();
    let rd_scored = score_layer(&rd, &scheme, "roads").unwrap();

    let pressures = vec![
        combine_pressure(&area, "land_use", 2020, &[("land_use", &lu_scored.raster)]).unwrap(),
        combine_pressure(&area, "roads", 2020, &[("roads", &rd_scored.raster)]).unwrap(),
    ];
    let map = aggregate(&area, "ghf", &scheme.combination, scheme.max_score, 2020, &pressures).unwrap();

    assert_eq!(map.rule, CombinationRule::SumThenCap);
    assert_relative_eq!(map.raster.get(0, 0).unwrap(), 4.0 + decay(3000.0 * 2f64.sqrt()), epsilon = 1e-9);
    assert_relative_eq!(map.raster.get(0, 3).unwrap(), 3.0 + decay(3000.0), epsilon = 1e-9);
    assert_relative_eq!(map.raster.get(3, 0).unwrap(), 4.0 + decay(3000.0), epsilon = 1e-9);
    assert_relative_eq!(map.raster.get(3, 3).unwrap(), 8.0);
    assert!(map.raster.data().iter().all(|v| (0.0..=10.0).contains(v)));
}

#[test]
fn unknown_land_use_code_fails() {
    let boundary = collection(&polygon("", 500_000.0, 8_000_000.0, 502_000.0, 8_002_000.0));
    let params = TemplateParams {
        cell_size: 1000.0,
        crs: CRS::from_epsg(32718),
        nodata: -9999.0,
    };
    let area = build_template("small", &boundary, &params).unwrap();

    let land_use = collection(&polygon(r#""use": "mining""#, 500_000.0, 8_000_000.0, 502_000.0, 8_002_000.0));
    let method = PreparationMethod::Rasterize(RasterizeParams {
        burn: BurnValue::Attribute {
            field: "use".into(),
            codes: Some(BTreeMap::from([("urban".to_string(), 2.0)])),
        },
        all_touched: false,
        background: Some(1.0),
    });
    let err = ingest(
        LayerIdentity::new("land_use", "small", "ghf", 1000.0),
        &LayerSource::Vector(land_use),
        None,
        &area,
        &method,
    )
    .unwrap_err();
    assert!(matches!(err, Error::UnscoredCategory { ref value, .. } if value == "mining"));
}
