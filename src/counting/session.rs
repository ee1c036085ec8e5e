//! 会话状态: 类别计数器 + 跟踪车辆表
//! Session state: per-class counters and the tracked-vehicle table
//!
//! 单写者约束: 只有当前活动的帧流水线修改会话状态, 快照读取
//! (广播、统计查询、标注) 通过同一把锁并发访问。

use super::tracker::{self, TrackedVehicle};
use super::types::{CountSnapshot, Detection, VehicleClass};
use std::collections::BTreeMap;

/// 单条检测的观测结果
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Observation {
    /// 匹配或新建车辆的ID
    pub vehicle_id: u32,
    /// 本次观测是否产生了计数 (过线且此前未计数)
    pub counted_now: bool,
}

/// 一个视频会话的全部可变状态, 进程内同时只有一个活动会话
#[derive(Debug, Default)]
pub struct SessionState {
    /// 类别计数器, 下标与VehicleClass::index一致
    counters: [u32; 5],

    /// 跟踪车辆表, 插入顺序即匹配平局顺序, 会话内只增不删
    vehicles: Vec<TrackedVehicle>,

    /// 下一个分配的车辆ID
    next_id: u32,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 重置: 计数器全部归零, 清空车辆表。
    /// 调用方持有会话锁, 观察者只能看到重置前或重置后的完整状态。
    pub fn reset(&mut self) {
        self.counters = [0; 5];
        self.vehicles.clear();
        self.next_id = 0;
    }

    /// 处理一条检测: 关联或新建车辆, 再做过线判定。
    /// 同帧内按检测发出顺序依次调用, 先匹配者立即更新位置 (见tracker模块)。
    pub fn observe(
        &mut self,
        detection: &Detection,
        max_distance: f32,
        line_position: i32,
    ) -> Observation {
        let center = detection.bbox.center();

        let idx = match tracker::closest_vehicle(&self.vehicles, center, max_distance) {
            Some(idx) => {
                self.vehicles[idx].center = center;
                idx
            }
            None => {
                let id = self.next_id;
                self.next_id += 1;
                self.vehicles
                    .push(TrackedVehicle::new(id, detection.class, center));
                self.vehicles.len() - 1
            }
        };

        // 过线计数: 中心点越过计数线且尚未计数时, 计数器+1并置已计数。
        // counted只翻转一次, 之后同一车辆的观测为空操作。
        let vehicle = &mut self.vehicles[idx];
        let counted_now = if !vehicle.counted && center.1 > line_position {
            vehicle.counted = true;
            self.counters[vehicle.class.index()] += 1;
            true
        } else {
            false
        };

        Observation {
            vehicle_id: vehicle.id,
            counted_now,
        }
    }

    pub fn count_for(&self, class: VehicleClass) -> u32 {
        self.counters[class.index()]
    }

    pub fn vehicle_count(&self) -> usize {
        self.vehicles.len()
    }

    pub fn vehicles(&self) -> &[TrackedVehicle] {
        &self.vehicles
    }

    /// 从当前计数器派生不可变快照。
    /// 聚合口径固定: heavy = Bus+Truck, light = Car+Motorcycle+Van。
    pub fn snapshot(&self) -> CountSnapshot {
        let mut class_counters = BTreeMap::new();
        let mut heavy_vehicles = 0;
        let mut light_vehicles = 0;

        for class in VehicleClass::ALL {
            let count = self.counters[class.index()];
            class_counters.insert(class.label(), count);
            if class.is_heavy() {
                heavy_vehicles += count;
            } else {
                light_vehicles += count;
            }
        }

        CountSnapshot {
            class_counters,
            heavy_vehicles,
            light_vehicles,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counting::types::BoundingBox;

    const LINE: i32 = 400;
    const RADIUS: f32 = 50.0;

    fn detection(class: VehicleClass, cx: i32, cy: i32) -> Detection {
        Detection {
            class,
            confidence: 0.9,
            bbox: BoundingBox {
                x1: cx - 10,
                y1: cy - 10,
                x2: cx + 10,
                y2: cy + 10,
            },
        }
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut session = SessionState::new();
        session.observe(&detection(VehicleClass::Car, 100, 450), RADIUS, LINE);
        assert_eq!(session.count_for(VehicleClass::Car), 1);
        assert_eq!(session.vehicle_count(), 1);

        session.reset();
        for class in VehicleClass::ALL {
            assert_eq!(session.count_for(class), 0);
        }
        assert_eq!(session.vehicle_count(), 0);
    }

    #[test]
    fn test_crossing_counts_exactly_once() {
        let mut session = SessionState::new();

        // 帧1: 线上方, 不计数, 创建车辆
        let obs = session.observe(&detection(VehicleClass::Car, 100, 380), RADIUS, LINE);
        assert!(!obs.counted_now);
        assert_eq!(session.count_for(VehicleClass::Car), 0);
        assert_eq!(session.vehicle_count(), 1);

        // 帧2: 越过计数线, Car计数变1
        let obs = session.observe(&detection(VehicleClass::Car, 100, 420), RADIUS, LINE);
        assert!(obs.counted_now);
        assert_eq!(session.count_for(VehicleClass::Car), 1);

        // 帧3: 继续在线下, 不重复计数
        let obs = session.observe(&detection(VehicleClass::Car, 100, 430), RADIUS, LINE);
        assert!(!obs.counted_now);
        assert_eq!(session.count_for(VehicleClass::Car), 1);
        assert_eq!(session.vehicle_count(), 1);
    }

    #[test]
    fn test_new_vehicle_below_line_counts_immediately() {
        let mut session = SessionState::new();
        let obs = session.observe(&detection(VehicleClass::Truck, 200, 500), RADIUS, LINE);
        assert!(obs.counted_now);
        assert_eq!(session.count_for(VehicleClass::Truck), 1);
    }

    #[test]
    fn test_match_updates_in_place() {
        let mut session = SessionState::new();
        let first = session.observe(&detection(VehicleClass::Van, 100, 100), RADIUS, LINE);
        let second = session.observe(&detection(VehicleClass::Van, 120, 110), RADIUS, LINE);
        assert_eq!(first.vehicle_id, second.vehicle_id);
        assert_eq!(session.vehicle_count(), 1);
        assert_eq!(session.vehicles()[0].center, (120, 110));
    }

    #[test]
    fn test_far_detection_creates_new_vehicle() {
        let mut session = SessionState::new();
        session.observe(&detection(VehicleClass::Van, 100, 100), RADIUS, LINE);
        session.observe(&detection(VehicleClass::Van, 300, 100), RADIUS, LINE);
        assert_eq!(session.vehicle_count(), 2);
    }

    #[test]
    fn test_two_detections_compete_for_one_vehicle() {
        let mut session = SessionState::new();
        session.observe(&detection(VehicleClass::Car, 100, 100), RADIUS, LINE);

        // 同帧两条检测都在既有车辆半径内: 先者按序匹配并把车辆
        // 拉到自己的位置, 后者若因此超出半径则新建车辆
        let first = session.observe(&detection(VehicleClass::Car, 100, 70), RADIUS, LINE);
        let second = session.observe(&detection(VehicleClass::Car, 100, 130), RADIUS, LINE);
        assert_eq!(first.vehicle_id, 0);
        assert_eq!(second.vehicle_id, 1);
        assert_eq!(session.vehicle_count(), 2);
    }

    #[test]
    fn test_increments_never_exceed_vehicles_created() {
        let mut session = SessionState::new();
        // 多辆车反复观测, 总计数不超过车辆数
        for frame in 0..10 {
            session.observe(&detection(VehicleClass::Car, 100, 350 + frame * 20), RADIUS, LINE);
            session.observe(&detection(VehicleClass::Bus, 400, 350 + frame * 20), RADIUS, LINE);
        }
        let total: u32 = VehicleClass::ALL
            .iter()
            .map(|c| session.count_for(*c))
            .sum();
        assert!(total as usize <= session.vehicle_count());
        assert_eq!(session.count_for(VehicleClass::Car), 1);
        assert_eq!(session.count_for(VehicleClass::Bus), 1);
    }

    #[test]
    fn test_snapshot_aggregation() {
        let mut session = SessionState::new();
        session.observe(&detection(VehicleClass::Bus, 100, 500), RADIUS, LINE);
        session.observe(&detection(VehicleClass::Truck, 300, 500), RADIUS, LINE);
        session.observe(&detection(VehicleClass::Car, 500, 500), RADIUS, LINE);
        session.observe(&detection(VehicleClass::Motorcycle, 700, 500), RADIUS, LINE);
        session.observe(&detection(VehicleClass::Van, 900, 500), RADIUS, LINE);

        let snapshot = session.snapshot();
        assert_eq!(snapshot.heavy_vehicles, 2);
        assert_eq!(snapshot.light_vehicles, 3);
        assert_eq!(snapshot.class_counters["Bus"], 1);
        assert_eq!(snapshot.class_counters["Car"], 1);
    }

    #[test]
    fn test_snapshot_wire_format() {
        let session = SessionState::new();
        let json = serde_json::to_value(session.snapshot()).unwrap();
        assert!(json.get("classCounters").is_some());
        assert_eq!(json["heavyVehicles"], 0);
        assert_eq!(json["lightVehicles"], 0);
    }

    #[test]
    fn test_class_fixed_at_creation() {
        let mut session = SessionState::new();
        session.observe(&detection(VehicleClass::Car, 100, 100), RADIUS, LINE);
        // 半径内出现不同类别的检测仍匹配同一车辆, 类别不变
        session.observe(&detection(VehicleClass::Truck, 110, 100), RADIUS, LINE);
        assert_eq!(session.vehicle_count(), 1);
        assert_eq!(session.vehicles()[0].class, VehicleClass::Car);
    }
}
