//! GeoJSON feature input

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::vector::{AttributeValue, Feature, FeatureCollection};
use geojson::GeoJson;
use serde_json::Value;
use std::path::Path;

/// Read a GeoJSON file into a [`FeatureCollection`].
///
/// The CRS is taken from the legacy `crs` member when present; otherwise it
/// is left undefined and the caller decides (RFC 7946 implies WGS84).
pub fn read_geojson<P: AsRef<Path>>(path: P) -> Result<FeatureCollection> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| Error::unreadable(path, e))?;
    read_geojson_str(&text).map_err(|e| match e {
        Error::UnreadableSource { reason, .. } => Error::unreadable(path, reason),
        other => other,
    })
}

/// Parse GeoJSON text (a FeatureCollection, a single Feature or a bare geometry)
pub fn read_geojson_str(text: &str) -> Result<FeatureCollection> {
    let parsed: GeoJson = text
        .parse()
        .map_err(|e: geojson::Error| Error::unreadable("<geojson>", e))?;

    let mut collection = FeatureCollection::new();

    match parsed {
        GeoJson::FeatureCollection(fc) => {
            collection.crs = fc
                .foreign_members
                .as_ref()
                .and_then(|m| m.get("crs"))
                .and_then(crs_member);
            for feature in fc.features {
                collection.push(convert_feature(feature)?);
            }
        }
        GeoJson::Feature(feature) => collection.push(convert_feature(feature)?),
        GeoJson::Geometry(geometry) => {
            let geometry = geo_types::Geometry::<f64>::try_from(geometry)
                .map_err(|e| Error::unreadable("<geojson>", e))?;
            collection.push(Feature::new(geometry));
        }
    }

    Ok(collection)
}

fn convert_feature(feature: geojson::Feature) -> Result<Feature> {
    let geometry = feature
        .geometry
        .map(geo_types::Geometry::<f64>::try_from)
        .transpose()
        .map_err(|e| Error::unreadable("<geojson>", e))?;

    let properties = feature
        .properties
        .unwrap_or_default()
        .into_iter()
        .map(|(k, v)| (k, attribute(v)))
        .collect();

    let id = feature.id.map(|id| match id {
        geojson::feature::Id::String(s) => s,
        geojson::feature::Id::Number(n) => n.to_string(),
    });

    Ok(Feature {
        geometry,
        properties,
        id,
    })
}

fn attribute(value: Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null,
        Value::Bool(b) => AttributeValue::Bool(b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => AttributeValue::Int(i),
            None => n.as_f64().map_or(AttributeValue::Null, AttributeValue::Float),
        },
        Value::String(s) => AttributeValue::String(s),
        other => AttributeValue::String(other.to_string()),
    }
}

/// `{"type": "name", "properties": {"name": "EPSG:32718"}}`
fn crs_member(value: &Value) -> Option<CRS> {
    let name = value.get("properties")?.get("name")?.as_str()?;
    CRS::parse(name).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::Geometry;

    const ROADS: &str = r#"{
        "type": "FeatureCollection",
        "crs": {"type": "name", "properties": {"name": "urn:ogc:def:crs:EPSG::32718"}},
        "features": [
            {"type": "Feature", "id": 1,
             "properties": {"class": "primary", "lanes": 2, "width": 7.5},
             "geometry": {"type": "LineString", "coordinates": [[0, 0], [100, 100]]}},
            {"type": "Feature",
             "properties": null,
             "geometry": {"type": "Point", "coordinates": [50, 50]}}
        ]
    }"#;

    #[test]
    fn parses_crs_and_attributes() {
        let fc = read_geojson_str(ROADS).unwrap();
        assert_eq!(fc.len(), 2);
        assert_eq!(fc.crs.as_ref().and_then(|c| c.epsg()), Some(32718));

        let first = &fc.features[0];
        assert_eq!(first.id.as_deref(), Some("1"));
        assert_eq!(
            first.get_property("class"),
            Some(&AttributeValue::String("primary".into()))
        );
        assert_eq!(first.get_property("lanes"), Some(&AttributeValue::Int(2)));
        assert!(matches!(first.geometry, Some(Geometry::LineString(_))));
        assert!(fc.features[1].properties.is_empty());
    }

    #[test]
    fn missing_crs_is_none() {
        let fc = read_geojson_str(
            r#"{"type": "FeatureCollection", "features": []}"#,
        )
        .unwrap();
        assert!(fc.crs.is_none());
        assert!(fc.is_empty());
    }

    #[test]
    fn invalid_json_is_unreadable() {
        assert!(matches!(
            read_geojson_str("{ nope"),
            Err(Error::UnreadableSource { .. })
        ));
    }
}
