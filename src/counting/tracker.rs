//! 跨帧身份关联 (最近中心点匹配)
//! Cross-frame identity association via nearest-centerpoint matching
//!
//! 匹配策略:
//! 1. 对每个检测计算中心点, 在所有已跟踪车辆中找欧氏距离最小者
//! 2. 距离必须在最大关联半径内, 平距离按插入顺序取先者
//! 3. 匹配命中立即更新车辆中心点, 同帧后续检测按更新后位置计算
//! 4. 无命中则创建新车辆
//!
//! 已知限制: 车辆一经创建在会话内永不删除, 消失的车辆冻结在最后位置,
//! 之后同区域的新目标可能错误匹配到冻结车辆。

use super::types::VehicleClass;

/// 被跟踪车辆 (一个物理车辆在会话内的持久身份)
#[derive(Clone, Debug)]
pub struct TrackedVehicle {
    /// 会话内唯一ID, 跨帧稳定
    pub id: u32,

    /// 类别, 创建时固定, 匹配时不复核
    pub class: VehicleClass,

    /// 当前中心点 (最近一次匹配框的中点)
    pub center: (i32, i32),

    /// 是否已计数 (只允许 false→true 单向翻转)
    pub counted: bool,
}

impl TrackedVehicle {
    pub fn new(id: u32, class: VehicleClass, center: (i32, i32)) -> Self {
        Self {
            id,
            class,
            center,
            counted: false,
        }
    }

    /// 到给定点的欧氏距离
    pub fn distance_to(&self, center: (i32, i32)) -> f32 {
        let dx = (center.0 - self.center.0) as f32;
        let dy = (center.1 - self.center.1) as f32;
        (dx * dx + dy * dy).sqrt()
    }
}

/// 在已跟踪车辆中查找距离最小且在半径内的车辆, 返回其下标。
/// 严格小于比较保证平距离时插入顺序在前者胜出 (确定性)。
pub fn closest_vehicle(
    vehicles: &[TrackedVehicle],
    center: (i32, i32),
    max_distance: f32,
) -> Option<usize> {
    let mut closest: Option<usize> = None;
    let mut min_distance = f32::INFINITY;

    for (idx, vehicle) in vehicles.iter().enumerate() {
        let distance = vehicle.distance_to(center);
        if distance < min_distance && distance <= max_distance {
            min_distance = distance;
            closest = Some(idx);
        }
    }

    closest
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vehicle(id: u32, center: (i32, i32)) -> TrackedVehicle {
        TrackedVehicle::new(id, VehicleClass::Car, center)
    }

    #[test]
    fn test_no_vehicles() {
        assert_eq!(closest_vehicle(&[], (0, 0), 50.0), None);
    }

    #[test]
    fn test_within_radius_matches() {
        let vehicles = vec![vehicle(1, (100, 100)), vehicle(2, (300, 300))];
        assert_eq!(closest_vehicle(&vehicles, (110, 100), 50.0), Some(0));
        assert_eq!(closest_vehicle(&vehicles, (290, 310), 50.0), Some(1));
    }

    #[test]
    fn test_outside_radius_no_match() {
        let vehicles = vec![vehicle(1, (100, 100))];
        assert_eq!(closest_vehicle(&vehicles, (100, 151), 50.0), None);
    }

    #[test]
    fn test_boundary_distance_matches() {
        // 正好等于半径也算命中
        let vehicles = vec![vehicle(1, (100, 100))];
        assert_eq!(closest_vehicle(&vehicles, (100, 150), 50.0), Some(0));
    }

    #[test]
    fn test_minimum_distance_wins() {
        let vehicles = vec![vehicle(1, (100, 100)), vehicle(2, (120, 100))];
        assert_eq!(closest_vehicle(&vehicles, (115, 100), 50.0), Some(1));
    }

    #[test]
    fn test_tie_breaks_by_insertion_order() {
        let vehicles = vec![vehicle(1, (90, 100)), vehicle(2, (110, 100))];
        // 等距时先插入者胜出
        assert_eq!(closest_vehicle(&vehicles, (100, 100), 50.0), Some(0));
    }
}
