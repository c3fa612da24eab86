//! Logical member naming.
//!
//! Every blob in a dataset release is addressed by a *logical path* of the
//! form `<sequence>/<frame>_<group>_<view>.<ext>`, for example
//! `0aee-78b4/00000042_img_front.jpg`. The same string identifies the blob in
//! every storage backend (folder tree, zip archive, pack container), which is
//! what makes the backends interchangeable to dataset-loading code.
//!
//! View names may themselves contain underscores (`left_45`, `left_stereo`),
//! so the parser disambiguates by matching the group field against the closed
//! set of known group tokens, longest token first (`depth_8bit` before
//! `depth`, `det_insseg_2d` before `det_2d`).

use std::fmt;

use crate::error::{Error, Result};

/// Zero-padding width used for frame indices in released data.
pub const DEFAULT_PAD_WIDTH: usize = 8;

/// A data modality shipped with the dataset.
///
/// The set is closed: release archives only ever contain these groups, and an
/// unknown token in a member name means the input is not release data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataGroup {
    /// RGB images.
    Img,
    /// 2D detection and tracking labels.
    Det2d,
    /// 3D detection and tracking labels.
    Det3d,
    /// 2D instance segmentation labels.
    DetInsseg2d,
    /// Semantic segmentation masks.
    Semseg,
    /// Depth maps (24-bit).
    Depth,
    /// Depth maps (8-bit).
    Depth8bit,
    /// Optical flow.
    Flow,
    /// LiDAR point clouds.
    Lidar,
}

/// Group tokens ordered longest-first so that prefix matching is unambiguous.
const GROUP_TOKENS: [(DataGroup, &str); 9] = [
    (DataGroup::DetInsseg2d, "det_insseg_2d"),
    (DataGroup::Depth8bit, "depth_8bit"),
    (DataGroup::Det2d, "det_2d"),
    (DataGroup::Det3d, "det_3d"),
    (DataGroup::Semseg, "semseg"),
    (DataGroup::Depth, "depth"),
    (DataGroup::Lidar, "lidar"),
    (DataGroup::Flow, "flow"),
    (DataGroup::Img, "img"),
];

impl DataGroup {
    /// The token used in member names and release URLs.
    pub fn token(self) -> &'static str {
        match self {
            DataGroup::Img => "img",
            DataGroup::Det2d => "det_2d",
            DataGroup::Det3d => "det_3d",
            DataGroup::DetInsseg2d => "det_insseg_2d",
            DataGroup::Semseg => "semseg",
            DataGroup::Depth => "depth",
            DataGroup::Depth8bit => "depth_8bit",
            DataGroup::Flow => "flow",
            DataGroup::Lidar => "lidar",
        }
    }

    /// Parse a bare group token, e.g. `"semseg"`.
    pub fn from_token(token: &str) -> Option<Self> {
        GROUP_TOKENS.iter().find(|(_, t)| *t == token).map(|(g, _)| *g)
    }

    /// Split `<group>_<view>` into its parts, longest group token first.
    ///
    /// Also used to derive the identity of release videos, whose file stems
    /// carry the same `<group>_<view>` field.
    pub fn split_view(field: &str) -> Option<(Self, &str)> {
        for (group, token) in GROUP_TOKENS {
            if let Some(rest) = field.strip_prefix(token) {
                if let Some(view) = rest.strip_prefix('_') {
                    return Some((group, view));
                }
            }
        }
        None
    }
}

impl fmt::Display for DataGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// The parsed form of a logical member name.
///
/// A `LogicalPath` round-trips losslessly through [`LogicalPath::parse`] and
/// [`LogicalPath::render`]: parsing accepts any frame-index width, rendering
/// reproduces exactly the configured width, so re-encoding a release with the
/// release's own width preserves on-disk names byte for byte.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LogicalPath {
    pub sequence: String,
    pub frame: u64,
    pub group: DataGroup,
    pub view: String,
    pub ext: String,
}

fn malformed(name: &str, reason: &'static str) -> Error {
    Error::MalformedPath { name: name.to_string(), reason }
}

impl LogicalPath {
    /// Build a logical path, validating the field invariants.
    pub fn new(
        sequence: impl Into<String>,
        frame: u64,
        group: DataGroup,
        view: impl Into<String>,
        ext: impl Into<String>,
    ) -> Result<Self> {
        let sequence = sequence.into();
        let view = view.into();
        let ext = ext.into();
        if sequence.is_empty() || sequence.contains('/') {
            return Err(Error::MalformedPath {
                name: sequence,
                reason: "sequence must be non-empty and free of '/'",
            });
        }
        if view.is_empty() || view.contains('/') {
            return Err(Error::MalformedPath {
                name: view,
                reason: "view must be non-empty and free of '/'",
            });
        }
        if ext.is_empty() || ext.contains('/') || ext.contains('.') {
            return Err(Error::MalformedPath {
                name: ext,
                reason: "extension must be a single non-empty component",
            });
        }
        Ok(Self { sequence, frame, group, view, ext })
    }

    /// Parse `<sequence>/<frame>_<group>_<view>.<ext>`.
    pub fn parse(name: &str) -> Result<Self> {
        let (sequence, member) = name
            .split_once('/')
            .ok_or_else(|| malformed(name, "expected '<sequence>/<member>'"))?;
        if sequence.is_empty() {
            return Err(malformed(name, "empty sequence"));
        }
        if member.contains('/') {
            return Err(malformed(name, "expected exactly one '/'"));
        }
        let (stem, ext) = member
            .rsplit_once('.')
            .ok_or_else(|| malformed(name, "missing extension"))?;
        if ext.is_empty() {
            return Err(malformed(name, "empty extension"));
        }
        let (frame_field, group_view) = stem
            .split_once('_')
            .ok_or_else(|| malformed(name, "missing '<frame>_<group>_<view>' fields"))?;
        if frame_field.is_empty() || !frame_field.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed(name, "frame index is not a decimal number"));
        }
        let frame: u64 = frame_field
            .parse()
            .map_err(|_| malformed(name, "frame index out of range"))?;
        let (group, view) = DataGroup::split_view(group_view)
            .ok_or_else(|| malformed(name, "unknown data group"))?;
        if view.is_empty() {
            return Err(malformed(name, "empty view"));
        }
        Ok(Self {
            sequence: sequence.to_string(),
            frame,
            group,
            view: view.to_string(),
            ext: ext.to_string(),
        })
    }

    /// Render the canonical member name with the given frame-index width.
    pub fn render(&self, pad_width: usize) -> String {
        format!(
            "{}/{:0width$}_{}_{}.{}",
            self.sequence,
            self.frame,
            self.group.token(),
            self.view,
            self.ext,
            width = pad_width
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_canonical_name() {
        let p = LogicalPath::parse("0aee-78b4/00000042_img_front.jpg").unwrap();
        assert_eq!(p.sequence, "0aee-78b4");
        assert_eq!(p.frame, 42);
        assert_eq!(p.group, DataGroup::Img);
        assert_eq!(p.view, "front");
        assert_eq!(p.ext, "jpg");
    }

    #[test]
    fn views_with_underscores_resolve_against_group_tokens() {
        let p = LogicalPath::parse("seq/00000001_det_2d_left_45.json").unwrap();
        assert_eq!(p.group, DataGroup::Det2d);
        assert_eq!(p.view, "left_45");

        let p = LogicalPath::parse("seq/00000001_depth_8bit_left_stereo.png").unwrap();
        assert_eq!(p.group, DataGroup::Depth8bit);
        assert_eq!(p.view, "left_stereo");

        let p = LogicalPath::parse("seq/00000001_depth_center.png").unwrap();
        assert_eq!(p.group, DataGroup::Depth);
        assert_eq!(p.view, "center");
    }

    #[test]
    fn round_trips_both_directions() {
        let names = [
            "seq001/00000000_img_front.jpg",
            "abc/00000123_det_insseg_2d_right_90.json",
            "x/99999999_lidar_center.ply",
        ];
        for name in names {
            let p = LogicalPath::parse(name).unwrap();
            assert_eq!(p.render(DEFAULT_PAD_WIDTH), name);
            assert_eq!(LogicalPath::parse(&p.render(DEFAULT_PAD_WIDTH)).unwrap(), p);
        }
    }

    #[test]
    fn parse_accepts_any_width_render_normalizes() {
        let p = LogicalPath::parse("seq/7_img_front.jpg").unwrap();
        assert_eq!(p.frame, 7);
        assert_eq!(p.render(8), "seq/00000007_img_front.jpg");
        assert_eq!(p.render(4), "seq/0007_img_front.jpg");
    }

    #[test]
    fn rejects_malformed_names() {
        for bad in [
            "no-slash.jpg",
            "a/b/00000000_img_front.jpg",
            "/00000000_img_front.jpg",
            "seq/00000000_img_front",
            "seq/xx_img_front.jpg",
            "seq/00000000_unknown_front.jpg",
            "seq/00000000_img.jpg",
            "seq/00000000.jpg",
        ] {
            assert!(
                matches!(LogicalPath::parse(bad), Err(Error::MalformedPath { .. })),
                "expected MalformedPath for {bad:?}"
            );
        }
    }

    #[test]
    fn new_validates_fields() {
        assert!(LogicalPath::new("seq", 0, DataGroup::Img, "front", "jpg").is_ok());
        assert!(LogicalPath::new("se/q", 0, DataGroup::Img, "front", "jpg").is_err());
        assert!(LogicalPath::new("seq", 0, DataGroup::Img, "", "jpg").is_err());
        assert!(LogicalPath::new("seq", 0, DataGroup::Img, "front", "tar.gz").is_err());
    }
}
