use std::{
    fs::File,
    io::{BufReader, Read},
    path::Path,
};

use anyhow::{bail, Context, Result};
use geo::{Coord, LineString, Polygon};
use geojson::{GeoJson, PolygonType, Position, Value};
use log::warn;
use pipagg_core::index::Feature;
use serde_json::Value as JsonValue;

/// Reads features from a GeoJSON file. See [`load_features()`].
pub fn read_features(path: &Path, label_attribute: &str) -> Result<Vec<Feature>> {
    let file = File::open(path)
        .with_context(|| format!("Unable to open feature file `{}'", path.display()))?;
    load_features(BufReader::new(file), label_attribute)
        .with_context(|| format!("Unable to load features from `{}'", path.display()))
}

/// Loads features from a GeoJSON feature collection (or a single feature).
/// The value of the property `label_attribute` becomes the feature's label.
/// A multi-polygon results in one feature per polygon, all with the same
/// label. Other geometries are skipped.
pub fn load_features<R: Read>(reader: R, label_attribute: &str) -> Result<Vec<Feature>> {
    let geojson: GeoJson = serde_json::from_reader(reader)?;
    let input = match geojson {
        GeoJson::FeatureCollection(fc) => fc.features,
        GeoJson::Feature(f) => vec![f],
        GeoJson::Geometry(_) => bail!("Expected a feature collection but found a geometry"),
    };

    let mut features = Vec::with_capacity(input.len());
    for (i, f) in input.iter().enumerate() {
        let label = label(f, label_attribute);
        match f.geometry.as_ref().map(|g| &g.value) {
            Some(Value::Polygon(rings)) => {
                let polygon = to_polygon(rings)
                    .with_context(|| format!("Invalid geometry in feature {i}"))?;
                features.push(Feature::new(label, polygon));
            }
            Some(Value::MultiPolygon(polygons)) => {
                for rings in polygons {
                    let polygon = to_polygon(rings)
                        .with_context(|| format!("Invalid geometry in feature {i}"))?;
                    features.push(Feature::new(label.clone(), polygon));
                }
            }
            Some(_) => warn!("Skipping feature {i}: its geometry is not a polygon"),
            None => warn!("Skipping feature {i}: it has no geometry"),
        }
    }

    Ok(features)
}

/// Gets the label of a feature from its properties
fn label(feature: &geojson::Feature, label_attribute: &str) -> Option<String> {
    match feature.property(label_attribute)? {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s.clone()),
        v => Some(v.to_string()),
    }
}

fn to_coord(position: &Position) -> Result<Coord> {
    match position.as_slice() {
        [x, y, ..] => Ok(Coord { x: *x, y: *y }),
        _ => bail!("Position must have at least 2 coordinates"),
    }
}

fn to_ring(ring: &[Position]) -> Result<LineString> {
    Ok(LineString::new(
        ring.iter().map(to_coord).collect::<Result<Vec<_>>>()?,
    ))
}

fn to_polygon(rings: &PolygonType) -> Result<Polygon> {
    let Some((exterior, interiors)) = rings.split_first() else {
        return Ok(Polygon::new(LineString::new(vec![]), vec![]));
    };
    Ok(Polygon::new(
        to_ring(exterior)?,
        interiors
            .iter()
            .map(|r| to_ring(r))
            .collect::<Result<Vec<_>>>()?,
    ))
}
