//! 车辆计数系统数据结构定义
//! Data structures for the vehicle counting system

use serde::Serialize;
use std::collections::BTreeMap;

// ========== 公共常量 ==========

/// 默认计数线位置 (像素Y坐标)
pub const DEFAULT_LINE_POSITION: i32 = 400;

/// 默认检测置信度阈值
pub const DEFAULT_CONF_THRESHOLD: f32 = 0.5;

/// 默认最大关联距离 (像素)
pub const DEFAULT_MAX_DISTANCE: f32 = 50.0;

// ========== 枚举类型 ==========

/// 车辆类别 (固定类别集, 下标与检测器类别索引一致)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VehicleClass {
    Bus,
    Car,
    Motorcycle,
    Truck,
    Van,
}

impl VehicleClass {
    /// 全部类别, 按检测器类别索引排列
    pub const ALL: [VehicleClass; 5] = [
        VehicleClass::Bus,
        VehicleClass::Car,
        VehicleClass::Motorcycle,
        VehicleClass::Truck,
        VehicleClass::Van,
    ];

    /// 检测器类别索引 → 车辆类别, 未知索引返回None
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        match self {
            VehicleClass::Bus => "Bus",
            VehicleClass::Car => "Car",
            VehicleClass::Motorcycle => "Motorcycle",
            VehicleClass::Truck => "Truck",
            VehicleClass::Van => "Van",
        }
    }

    /// 重型车: Bus + Truck, 其余为轻型车
    pub fn is_heavy(self) -> bool {
        matches!(self, VehicleClass::Bus | VehicleClass::Truck)
    }
}

// ========== 数据结构 ==========

/// 检测器原始输出 (类别索引 + 置信度 + 像素框)
#[derive(Clone, Debug)]
pub struct RawDetection {
    pub class_index: usize,
    pub confidence: f32,
    /// [x1, y1, x2, y2] 像素坐标
    pub bbox: [f32; 4],
}

/// 轴对齐边界框 (整数像素坐标)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    /// 中心点 (用于关联与过线判定)
    pub fn center(&self) -> (i32, i32) {
        ((self.x1 + self.x2) / 2, (self.y1 + self.y2) / 2)
    }
}

/// 规范化检测结果 (每帧消费后丢弃)
#[derive(Clone, Debug)]
pub struct Detection {
    pub class: VehicleClass,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// 计数快照 (不可变, 广播与统计查询共用的线上格式)
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CountSnapshot {
    pub class_counters: BTreeMap<&'static str, u32>,
    pub heavy_vehicles: u32,
    pub light_vehicles: u32,
}
