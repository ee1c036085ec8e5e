//! 检测结果规范化
//! Normalizes raw detector output into uniform detection records

use super::types::{BoundingBox, Detection, RawDetection, VehicleClass};
use tracing::debug;

/// 规范化一帧的原始检测结果:
/// 1. 过滤低于置信度阈值的检测
/// 2. 类别索引映射到固定类别集, 未知索引丢弃 (数据异常, 不中断处理)
/// 3. 丢弃退化框 (x2<=x1 或 y2<=y1)
///
/// 输出顺序与检测器发出顺序一致。
pub fn normalize(raw: &[RawDetection], conf_threshold: f32) -> Vec<Detection> {
    let mut detections = Vec::with_capacity(raw.len());

    for det in raw {
        if det.confidence < conf_threshold {
            continue;
        }

        let class = match VehicleClass::from_index(det.class_index) {
            Some(class) => class,
            None => {
                debug!(
                    class_index = det.class_index,
                    "dropping detection with unknown class index"
                );
                continue;
            }
        };

        let bbox = BoundingBox {
            x1: det.bbox[0] as i32,
            y1: det.bbox[1] as i32,
            x2: det.bbox[2] as i32,
            y2: det.bbox[3] as i32,
        };
        if bbox.x2 <= bbox.x1 || bbox.y2 <= bbox.y1 {
            debug!(?bbox, "dropping degenerate bounding box");
            continue;
        }

        detections.push(Detection {
            class,
            confidence: det.confidence,
            bbox,
        });
    }

    detections
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(class_index: usize, confidence: f32, bbox: [f32; 4]) -> RawDetection {
        RawDetection {
            class_index,
            confidence,
            bbox,
        }
    }

    #[test]
    fn test_empty_input() {
        assert!(normalize(&[], 0.5).is_empty());
    }

    #[test]
    fn test_confidence_filter() {
        let input = vec![
            raw(1, 0.49, [0.0, 0.0, 10.0, 10.0]),
            raw(1, 0.51, [0.0, 0.0, 10.0, 10.0]),
        ];
        let out = normalize(&input, 0.5);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].confidence, 0.51);
    }

    #[test]
    fn test_unknown_class_dropped() {
        let input = vec![
            raw(7, 0.9, [0.0, 0.0, 10.0, 10.0]),
            raw(0, 0.9, [0.0, 0.0, 10.0, 10.0]),
        ];
        let out = normalize(&input, 0.5);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].class, VehicleClass::Bus);
    }

    #[test]
    fn test_degenerate_box_dropped() {
        let input = vec![
            raw(1, 0.9, [10.0, 10.0, 10.0, 20.0]),
            raw(1, 0.9, [10.0, 20.0, 20.0, 10.0]),
        ];
        assert!(normalize(&input, 0.5).is_empty());
    }

    #[test]
    fn test_order_preserved() {
        let input = vec![
            raw(1, 0.9, [0.0, 0.0, 10.0, 10.0]),
            raw(3, 0.8, [20.0, 0.0, 30.0, 10.0]),
            raw(4, 0.7, [40.0, 0.0, 50.0, 10.0]),
        ];
        let out = normalize(&input, 0.5);
        let classes: Vec<_> = out.iter().map(|d| d.class).collect();
        assert_eq!(
            classes,
            vec![VehicleClass::Car, VehicleClass::Truck, VehicleClass::Van]
        );
    }
}
