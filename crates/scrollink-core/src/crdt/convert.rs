//! Conversion between strokes and Loro values.

use super::CrdtError;
use crate::stroke::{Privilege, Stroke, StrokeColor, StrokePoint, Tool};
use kurbo::Rect;
use loro::{LoroMap, LoroMapValue, LoroResult, LoroValue};

const KEY_ID: &str = "id";
const KEY_CREATED_AT: &str = "created_at";
const KEY_TOOL: &str = "tool";
const KEY_SIZE: &str = "size";
const KEY_COLOR: &str = "color";
const KEY_DONE: &str = "done";
const KEY_PEN: &str = "pen";
const KEY_PRIVILEGE: &str = "privilege";

// Bounding box keys
const KEY_MIN_X: &str = "min_x";
const KEY_MIN_Y: &str = "min_y";
const KEY_MAX_X: &str = "max_x";
const KEY_MAX_Y: &str = "max_y";

/// Flat `[x0, y0, p0, x1, y1, p1, ...]` list.
const KEY_POINTS: &str = "points";

const PRIVILEGE_ADMIN: &str = "admin";

fn get_double(map: &LoroMapValue, key: &str) -> Option<f64> {
    match map.get(key)? {
        LoroValue::Double(d) => Some(*d),
        LoroValue::I64(i) => Some(*i as f64),
        _ => None,
    }
}

fn get_string(map: &LoroMapValue, key: &str) -> Option<String> {
    match map.get(key)? {
        LoroValue::String(s) => Some(s.to_string()),
        _ => None,
    }
}

fn get_bool(map: &LoroMapValue, key: &str) -> Option<bool> {
    match map.get(key)? {
        LoroValue::Bool(b) => Some(*b),
        _ => None,
    }
}

fn number(value: &LoroValue) -> Option<f64> {
    match value {
        LoroValue::Double(d) => Some(*d),
        LoroValue::I64(i) => Some(*i as f64),
        _ => None,
    }
}

/// Write every field of `stroke` into `map`.
pub fn stroke_to_loro(stroke: &Stroke, map: &LoroMap) -> LoroResult<()> {
    map.insert(KEY_ID, stroke.id.clone())?;
    map.insert(KEY_CREATED_AT, stroke.created_at)?;
    map.insert(KEY_TOOL, stroke.tool.name())?;
    map.insert(KEY_SIZE, stroke.size)?;
    map.insert(KEY_COLOR, stroke.color.to_hex())?;
    map.insert(KEY_DONE, stroke.done)?;
    map.insert(KEY_PEN, stroke.pen)?;
    if stroke.is_privileged() {
        map.insert(KEY_PRIVILEGE, PRIVILEGE_ADMIN)?;
    }

    map.insert(KEY_MIN_X, stroke.bbox.x0)?;
    map.insert(KEY_MIN_Y, stroke.bbox.y0)?;
    map.insert(KEY_MAX_X, stroke.bbox.x1)?;
    map.insert(KEY_MAX_Y, stroke.bbox.y1)?;

    let flat: Vec<f64> = stroke
        .points
        .iter()
        .flat_map(|p| [p.x, p.y, p.pressure])
        .collect();
    map.insert(KEY_POINTS, flat)?;
    Ok(())
}

/// Read a stroke back. Missing or mistyped fields are a decode error for
/// that id only.
pub fn stroke_from_loro(id: &str, map: &LoroMapValue) -> Result<Stroke, CrdtError> {
    let missing = |field: &str| CrdtError::Decode {
        id: id.to_string(),
        reason: format!("missing or invalid field `{field}`"),
    };

    let stroke_id = get_string(map, KEY_ID).ok_or_else(|| missing(KEY_ID))?;
    if stroke_id != id {
        return Err(CrdtError::Decode {
            id: id.to_string(),
            reason: format!("entry holds stroke {stroke_id}"),
        });
    }
    let created_at = get_double(map, KEY_CREATED_AT).ok_or_else(|| missing(KEY_CREATED_AT))?;
    let tool = get_string(map, KEY_TOOL)
        .and_then(|t| Tool::from_name(&t))
        .ok_or_else(|| missing(KEY_TOOL))?;
    let size = get_double(map, KEY_SIZE).ok_or_else(|| missing(KEY_SIZE))?;
    let color = get_string(map, KEY_COLOR)
        .and_then(|c| StrokeColor::parse(&c))
        .ok_or_else(|| missing(KEY_COLOR))?;
    let done = get_bool(map, KEY_DONE).ok_or_else(|| missing(KEY_DONE))?;
    let pen = get_bool(map, KEY_PEN).unwrap_or(false);
    let privilege = match get_string(map, KEY_PRIVILEGE).as_deref() {
        Some(PRIVILEGE_ADMIN) => Privilege::Admin,
        _ => Privilege::User,
    };

    let bbox = Rect::new(
        get_double(map, KEY_MIN_X).ok_or_else(|| missing(KEY_MIN_X))?,
        get_double(map, KEY_MIN_Y).ok_or_else(|| missing(KEY_MIN_Y))?,
        get_double(map, KEY_MAX_X).ok_or_else(|| missing(KEY_MAX_X))?,
        get_double(map, KEY_MAX_Y).ok_or_else(|| missing(KEY_MAX_Y))?,
    );

    let Some(LoroValue::List(flat)) = map.get(KEY_POINTS) else {
        return Err(missing(KEY_POINTS));
    };
    if flat.len() % 3 != 0 {
        return Err(missing(KEY_POINTS));
    }
    let points = flat
        .chunks_exact(3)
        .map(|c| Some(StrokePoint::new(number(&c[0])?, number(&c[1])?, number(&c[2])?)))
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| missing(KEY_POINTS))?;

    let stroke = Stroke {
        id: stroke_id,
        created_at,
        tool,
        size,
        color,
        points,
        done,
        bbox,
        pen,
        privilege,
    };
    if !stroke.is_well_formed() {
        return Err(CrdtError::Decode {
            id: id.to_string(),
            reason: "stroke is not well formed".to_string(),
        });
    }
    Ok(stroke)
}

#[cfg(test)]
mod tests {
    use super::*;
    use loro::LoroDoc;

    fn sample() -> Stroke {
        let points = vec![
            StrokePoint::new(1.0, 2.0, 0.5),
            StrokePoint::new(3.5, 4.25, 0.75),
        ];
        Stroke {
            id: "s1".into(),
            created_at: 1234.5,
            tool: Tool::Highlighter,
            size: 20.0,
            color: StrokeColor::rgb(0xff, 0xcd, 0x75),
            bbox: Rect::new(-79.0, -78.0, 83.5, 84.25),
            points,
            done: true,
            pen: true,
            privilege: Privilege::Admin,
        }
    }

    fn written(stroke: &Stroke) -> LoroMapValue {
        let doc = LoroDoc::new();
        let map = doc.get_map("strokes");
        let entry = map.insert_container(&stroke.id, LoroMap::new()).unwrap();
        stroke_to_loro(stroke, &entry).unwrap();
        doc.commit();
        match map.get_deep_value() {
            LoroValue::Map(all) => match all.get(&stroke.id) {
                Some(LoroValue::Map(m)) => m.clone(),
                other => panic!("unexpected {other:?}"),
            },
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_stroke_survives_loro() {
        let stroke = sample();
        let back = stroke_from_loro("s1", &written(&stroke)).unwrap();
        assert_eq!(back, stroke);
    }

    #[test]
    fn test_default_privilege_omitted() {
        let mut stroke = sample();
        stroke.privilege = Privilege::User;
        let map = written(&stroke);
        assert!(map.get(KEY_PRIVILEGE).is_none());
        assert_eq!(stroke_from_loro("s1", &map).unwrap().privilege, Privilege::User);
    }

    #[test]
    fn test_missing_field_is_decode_error() {
        let doc = LoroDoc::new();
        let map = doc.get_map("strokes");
        let entry = map.insert_container("s1", LoroMap::new()).unwrap();
        entry.insert(KEY_ID, "s1").unwrap();
        entry.insert(KEY_TOOL, "ink").unwrap();
        doc.commit();
        let LoroValue::Map(all) = map.get_deep_value() else {
            panic!("not a map");
        };
        let Some(LoroValue::Map(partial)) = all.get("s1") else {
            panic!("missing entry");
        };
        match stroke_from_loro("s1", partial) {
            Err(CrdtError::Decode { id, reason }) => {
                assert_eq!(id, "s1");
                assert!(reason.contains(KEY_CREATED_AT));
            }
            other => panic!("expected decode error, got {other:?}"),
        }
    }

    #[test]
    fn test_mismatched_id_rejected() {
        let map = written(&sample());
        assert!(stroke_from_loro("other", &map).is_err());
    }
}
