use crate::detection::{by_score_desc, Detection};

use log::trace;
use serde_derive::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct NmsConfig {
    pub iou_threshold: f32,
    /// suppress only within the same class id
    pub class_grouped: bool,
    pub max_boxes: usize,
}

impl NmsConfig {
    pub fn new(iou_threshold: f32) -> Self {
        Self {
            iou_threshold,
            ..Default::default()
        }
    }
}

impl Default for NmsConfig {
    fn default() -> Self {
        Self {
            iou_threshold: 0.45,
            class_grouped: true,
            max_boxes: 500,
        }
    }
}

/// A candidate tagged with its input position for tie-breaking.
type Ranked = (usize, Detection);

#[inline]
fn by_rank(a: &Ranked, b: &Ranked) -> Ordering {
    by_score_desc(&a.1, &b.1).then(a.0.cmp(&b.0))
}

pub struct Suppressor {
    config: NmsConfig,
}

impl Suppressor {
    pub fn new(config: NmsConfig) -> Self {
        Self { config }
    }

    #[inline]
    pub fn config(&self) -> &NmsConfig {
        &self.config
    }

    /// Returns the survivors ordered by descending score; equal scores keep
    /// their input order, across classes too. NaN scores go last.
    pub fn suppress(&self, dets: Vec<Detection>) -> Vec<Detection> {
        if dets.is_empty() {
            return dets;
        }

        let mut ranked: Vec<Ranked> = dets.into_iter().enumerate().collect();
        ranked.sort_by(by_rank);

        let mut results = if self.config.class_grouped {
            let mut groups: BTreeMap<i32, Vec<Ranked>> = BTreeMap::new();
            for item in ranked {
                groups.entry(item.1.class).or_default().push(item);
            }

            let mut kept = Vec::new();
            for (_, group) in groups {
                kept.extend(self.non_maximum_supression(group));
            }

            kept.sort_by(by_rank);
            kept
        } else {
            self.non_maximum_supression(ranked)
        };

        results.truncate(self.config.max_boxes);
        results.into_iter().map(|(_, det)| det).collect()
    }

    /// Expects `dets` already sorted by `by_rank`.
    fn non_maximum_supression(&self, dets: Vec<Ranked>) -> Vec<Ranked> {
        let total = dets.len();
        let mut retain = vec![true; total];

        for idx in 0..total {
            if !retain[idx] {
                continue;
            }

            for other in idx + 1..total {
                if retain[other] && dets[idx].1.iou(&dets[other].1) > self.config.iou_threshold {
                    retain[other] = false;
                }
            }
        }

        let kept: Vec<_> = dets
            .into_iter()
            .zip(retain)
            .filter_map(|(item, keep)| keep.then_some(item))
            .collect();

        trace!("nms kept {} of {}", kept.len(), total);
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bbox::BBox;

    fn det(l: f32, t: f32, r: f32, b: f32, confidence: f32, class: i32) -> Detection {
        Detection::new(BBox::ltrb(l, t, r, b).as_xywh(), confidence, class)
    }

    #[test]
    fn keeps_only_best_of_heavy_overlap() {
        let nms = Suppressor::new(NmsConfig::new(0.45));
        let kept = nms.suppress(vec![
            det(0.0, 0.0, 10.0, 10.0, 0.6, 0),
            det(1.0, 0.0, 11.0, 10.0, 0.9, 0),
        ]);

        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].confidence, 0.9);
    }

    #[test]
    fn keeps_both_below_threshold() {
        let nms = Suppressor::new(NmsConfig::new(0.45));

        // iou = 1/3
        let kept = nms.suppress(vec![
            det(0.0, 0.0, 10.0, 10.0, 0.6, 0),
            det(5.0, 0.0, 15.0, 10.0, 0.9, 0),
        ]);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn threshold_is_strict() {
        let nms = Suppressor::new(NmsConfig::new(0.5));

        // iou exactly 0.5
        let kept = nms.suppress(vec![
            det(0.0, 0.0, 10.0, 10.0, 0.6, 0),
            det(0.0, 0.0, 10.0, 20.0, 0.9, 0),
        ]);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn classes_are_suppressed_independently() {
        let mut config = NmsConfig::new(0.45);
        let grouped = Suppressor::new(config.clone());
        let dets = vec![
            det(0.0, 0.0, 10.0, 10.0, 0.8, 0),
            det(0.0, 0.0, 10.0, 10.0, 0.7, 1),
        ];

        assert_eq!(grouped.suppress(dets.clone()).len(), 2);

        config.class_grouped = false;
        let global = Suppressor::new(config);
        let kept = global.suppress(dets);

        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].class, 0);
    }

    #[test]
    fn ties_keep_first_seen() {
        let nms = Suppressor::new(NmsConfig::new(0.45));
        let kept = nms.suppress(vec![
            det(0.0, 0.0, 10.0, 10.0, 0.7, 3),
            det(0.5, 0.0, 10.5, 10.0, 0.7, 3),
        ]);

        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].x, 5.0);
    }

    #[test]
    fn degenerate_boxes_survive() {
        let nms = Suppressor::new(NmsConfig::new(0.1));
        let kept = nms.suppress(vec![
            det(0.0, 0.0, 10.0, 10.0, 0.9, 0),
            det(2.0, 2.0, 2.0, 2.0, 0.8, 0),
        ]);

        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn is_idempotent() {
        let nms = Suppressor::new(NmsConfig::new(0.3));
        let dets: Vec<_> = (0..40)
            .map(|i| {
                let x = (i % 7) as f32 * 6.0;
                let y = (i / 7) as f32 * 4.0;
                det(x, y, x + 12.0, y + 9.0, 0.3 + (i % 5) as f32 * 0.1, i % 2)
            })
            .collect();

        let once = nms.suppress(dets);
        let twice = nms.suppress(once.clone());

        assert_eq!(once, twice);
    }

    #[test]
    fn caps_output_at_max_boxes() {
        let mut config = NmsConfig::new(0.45);
        config.max_boxes = 2;
        let nms = Suppressor::new(config);

        let kept = nms.suppress(vec![
            det(0.0, 0.0, 1.0, 1.0, 0.3, 0),
            det(10.0, 0.0, 11.0, 1.0, 0.9, 0),
            det(20.0, 0.0, 21.0, 1.0, 0.6, 0),
        ]);

        let scores: Vec<_> = kept.iter().map(|d| d.confidence).collect();
        assert_eq!(scores, vec![0.9, 0.6]);
    }

    #[test]
    fn empty_input_is_not_an_error() {
        let nms = Suppressor::new(NmsConfig::default());
        assert!(nms.suppress(Vec::new()).is_empty());
    }

    #[test]
    fn equal_scores_across_classes_keep_input_order() {
        let nms = Suppressor::new(NmsConfig::new(0.45));
        let kept = nms.suppress(vec![
            det(0.0, 0.0, 10.0, 10.0, 0.7, 5),
            det(20.0, 0.0, 30.0, 10.0, 0.7, 1),
            det(40.0, 0.0, 50.0, 10.0, 0.9, 3),
        ]);

        let classes: Vec<_> = kept.iter().map(|d| d.class).collect();
        assert_eq!(classes, vec![3, 5, 1]);
    }

    #[test]
    fn nan_scores_do_not_panic() {
        for class_grouped in [true, false] {
            let nms = Suppressor::new(NmsConfig {
                class_grouped,
                ..Default::default()
            });

            let dets: Vec<_> = (0..64)
                .map(|i| {
                    let x = i as f32 * 20.0;
                    let p = if i % 3 == 0 { f32::NAN } else { (i % 10) as f32 / 10.0 };
                    det(x, 0.0, x + 10.0, 10.0, p, i % 4)
                })
                .collect();

            let kept = nms.suppress(dets);

            assert_eq!(kept.len(), 64);
            assert!(kept[..42].iter().all(|d| !d.confidence.is_nan()));
            assert!(kept[42..].iter().all(|d| d.confidence.is_nan()));
        }
    }
}
