use crate::bbox::{BBox, Xywh};
use crate::color::ColorDescriptor;
use crate::context::Context;
use crate::labels::ClassNames;
use crate::scene::Participant;

use serde_derive::{Deserialize, Serialize};
use std::fmt;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum TrackingQuality {
    Excellent,
    Good,
    Ok,
    Poor,
}

impl TrackingQuality {
    pub fn from_score(score: f32) -> Self {
        if score > 0.8 {
            TrackingQuality::Excellent
        } else if score > 0.6 {
            TrackingQuality::Good
        } else if score > 0.4 {
            TrackingQuality::Ok
        } else {
            TrackingQuality::Poor
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingQuality::Excellent => "EXCELLENT",
            TrackingQuality::Good => "GOOD",
            TrackingQuality::Ok => "OK",
            TrackingQuality::Poor => "POOR",
        }
    }
}

impl fmt::Display for TrackingQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-frame snapshot of one track, handed to renderers and reporters.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Track {
    pub track_id: u32,
    pub bbox: BBox<Xywh>,
    pub class: i32,
    pub confidence: f32,

    // only set when the sampled color was reliable
    pub color: Option<ColorDescriptor>,
    pub tracking_quality: f32,

    // px per frame
    pub speed: Option<f32>,
    pub missing_frames: u32,
    pub context: Context,
}

impl Track {
    #[inline]
    pub fn quality(&self) -> TrackingQuality {
        TrackingQuality::from_score(self.tracking_quality)
    }

    /// `true` when the track was matched on the latest frame.
    #[inline]
    pub fn is_visible(&self) -> bool {
        self.missing_frames == 0
    }

    /// `ID:3 car 87.5% (red) [EXCELLENT]`
    pub fn label(&self, names: &ClassNames) -> String {
        let mut label = format!(
            "ID:{} {} {:.1}%",
            self.track_id,
            names.name(self.class),
            self.confidence * 100.0
        );

        if let Some(color) = &self.color {
            label.push_str(&format!(" ({})", color.name));
        }

        label.push_str(&format!(" [{}]", self.quality()));
        label
    }
}

impl From<(&Participant, Context)> for Track {
    fn from((p, context): (&Participant, Context)) -> Self {
        Self {
            track_id: p.id,
            bbox: p.bbox,
            class: p.class,
            confidence: p.confidence,
            color: p.color.valid.then_some(p.color),
            tracking_quality: p.tracking_quality,
            speed: p.speed(),
            missing_frames: p.missing_frames,
            context,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::ColorName;
    use crate::Detection;

    #[test]
    fn quality_bands() {
        assert_eq!(TrackingQuality::from_score(0.95), TrackingQuality::Excellent);
        assert_eq!(TrackingQuality::from_score(0.8), TrackingQuality::Good);
        assert_eq!(TrackingQuality::from_score(0.5), TrackingQuality::Ok);
        assert_eq!(TrackingQuality::from_score(0.4), TrackingQuality::Poor);
        assert_eq!(TrackingQuality::from_score(0.0), TrackingQuality::Poor);
    }

    #[test]
    fn invalid_color_is_not_emitted() {
        let det = Detection::new(BBox::xywh(10.0, 10.0, 4.0, 4.0), 0.9, 2);
        let p = Participant::new(7, &det, 5);

        let track = Track::from((&p, Context::City));

        assert_eq!(track.track_id, 7);
        assert_eq!(track.color, None);
        assert_eq!(track.speed, None);
        assert_eq!(track.context, Context::City);
        assert!(track.is_visible());
    }

    #[test]
    fn label_uses_class_names_and_color() {
        let mut det = Detection::new(BBox::xywh(10.0, 10.0, 4.0, 4.0), 0.875, 2);
        det.color = Some(ColorDescriptor {
            h: 0.0,
            s: 200.0,
            v: 200.0,
            name: ColorName::Red,
            valid: true,
        });
        let p = Participant::new(3, &det, 5);
        let names = ClassNames::new(vec!["person".into(), "bicycle".into(), "car".into()]);

        let track = Track::from((&p, Context::Indoor));

        assert_eq!(track.label(&names), "ID:3 car 87.5% (red) [EXCELLENT]");
        assert_eq!(
            track.label(&ClassNames::default()),
            "ID:3 class2 87.5% (red) [EXCELLENT]"
        );

        let poor = Track {
            tracking_quality: 0.3,
            color: None,
            ..track
        };
        assert_eq!(poor.label(&names), "ID:3 car 87.5% [POOR]");
    }
}
