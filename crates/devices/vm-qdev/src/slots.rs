//! 插槽查询与合并
//!
//! 每条总线描述为一个或多个 [`DeviceSlotInfo`]。查询时按先序遍历子树，
//! 逐个用 [`add_slot`] 折叠进结果列表：与已有条目可合并时就地合并，
//! 否则插到列表头部。合并只扩展一个取值不同的选项，不合并相邻区间。

use crate::error::QdevResult;
use crate::tree::{BusId, DeviceTree};
use crate::value_set::ValueSet;
use serde::{Deserialize, Serialize};

/// 插槽选项：选项名及其允许的取值集合
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotOption {
    pub option: String,
    pub values: ValueSet,
}

impl SlotOption {
    pub fn new(option: impl Into<String>, values: impl Into<ValueSet>) -> Self {
        Self {
            option: option.into(),
            values: values.into(),
        }
    }
}

/// 一类可插入位置的描述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DeviceSlotInfo {
    /// 可插入的设备类型（有序）
    pub device_types: Vec<String>,
    pub hotpluggable: bool,
    pub available: bool,
    /// 这一类插槽的数量
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    /// 已占用该插槽的设备路径
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    /// `opts` 是否已列出插入所需的全部选项
    pub opts_complete: bool,
    pub opts: Vec<SlotOption>,
}

impl DeviceSlotInfo {
    pub fn new(device_types: Vec<String>) -> Self {
        Self {
            device_types,
            hotpluggable: false,
            available: false,
            count: None,
            device: None,
            opts_complete: true,
            opts: Vec::new(),
        }
    }

    pub fn option(&self, name: &str) -> Option<&SlotOption> {
        self.opts.iter().find(|o| o.option == name)
    }

    fn option_mut(&mut self, name: &str) -> Option<&mut SlotOption> {
        self.opts.iter_mut().find(|o| o.option == name)
    }

    /// 设置选项
    ///
    /// 新选项插到 `opts` 头部；同名选项已存在时原位替换其取值。
    pub fn set_option(&mut self, name: impl Into<String>, values: impl Into<ValueSet>) -> &mut Self {
        let name = name.into();
        let values = values.into();
        match self.option_mut(&name) {
            Some(existing) => existing.values = values,
            None => self.opts.insert(
                0,
                SlotOption {
                    option: name,
                    values,
                },
            ),
        }
        self
    }
}

/// 两个描述能否合并
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Combinability {
    /// 不能合并
    Incompatible,
    /// 完全相同，合并时只累加数量
    Identical,
    /// 仅在一个选项上取值不同，合并时扩展该选项
    DiffersIn(String),
}

impl Combinability {
    pub fn is_combinable(&self) -> bool {
        !matches!(self, Combinability::Incompatible)
    }
}

/// 比较两组选项
///
/// 选项名必须双向覆盖；取值不同的选项最多一个，一旦出现第二个不同的
/// 选项名立即判定为不可合并。
pub fn options_can_be_combined(a: &[SlotOption], b: &[SlotOption]) -> Combinability {
    if b.iter().any(|bo| !a.iter().any(|ao| ao.option == bo.option)) {
        return Combinability::Incompatible;
    }

    let mut mismatch: Option<&str> = None;
    for ao in a {
        let Some(bo) = b.iter().find(|bo| bo.option == ao.option) else {
            return Combinability::Incompatible;
        };
        if ao.values != bo.values {
            if mismatch.is_some_and(|m| m != ao.option) {
                return Combinability::Incompatible;
            }
            mismatch = Some(ao.option.as_str());
        }
    }

    match mismatch {
        Some(name) => Combinability::DiffersIn(name.to_string()),
        None => Combinability::Identical,
    }
}

/// 两个插槽描述能否合并
///
/// 任一方带有 `device`（描述的是已占用的具体插槽）时不能合并。
pub fn can_combine(a: &DeviceSlotInfo, b: &DeviceSlotInfo) -> Combinability {
    if a.available != b.available
        || a.hotpluggable != b.hotpluggable
        || a.count.is_some() != b.count.is_some()
        || a.opts_complete != b.opts_complete
        || a.device.is_some()
        || b.device.is_some()
        || a.device_types != b.device_types
    {
        return Combinability::Incompatible;
    }
    options_can_be_combined(&a.opts, &b.opts)
}

/// 把 `b` 合并进 `a`
///
/// 调用方必须先确认 `can_combine(a, b)` 的结果为 `how`。
pub fn combine(a: &mut DeviceSlotInfo, b: DeviceSlotInfo, how: &Combinability) {
    if let (Some(count), Some(extra)) = (a.count.as_mut(), b.count) {
        *count = count.saturating_add(extra);
    }
    if let Combinability::DiffersIn(name) = how {
        let addition = b.option(name).map(|o| o.values.clone());
        if let (Some(target), Some(addition)) = (a.option_mut(name), addition) {
            target.values.extend(&addition);
        }
    }
}

/// 可合并时把 `b` 合并进 `a`，否则原样交还 `b`
pub fn try_combine(a: &mut DeviceSlotInfo, b: DeviceSlotInfo) -> Result<(), DeviceSlotInfo> {
    let how = can_combine(a, &b);
    if !how.is_combinable() {
        return Err(b);
    }
    combine(a, b, &how);
    Ok(())
}

/// 把插槽折叠进列表
///
/// 与第一个可合并的条目就地合并（先匹配者胜出）；都不能合并时插到列表头部。
pub fn add_slot(list: &mut Vec<DeviceSlotInfo>, slot: DeviceSlotInfo) {
    let mut slot = slot;
    for existing in list.iter_mut() {
        match try_combine(existing, slot) {
            Ok(()) => return,
            Err(back) => slot = back,
        }
    }
    list.insert(0, slot);
}

impl DeviceTree {
    /// 总线的通用插槽描述
    ///
    /// - 设备类型：总线接受的类型
    /// - 可热插拔：总线处理器实现了 `unplug` 或 `unplug_request`
    /// - 可用：总线未满，且未启用"仅热插拔"策略或总线可热插拔
    /// - 唯一选项 `bus`：总线名
    pub fn make_bus_slot(&self, bus: BusId) -> QdevResult<DeviceSlotInfo> {
        let b = self.bus(bus)?;
        let hotpluggable = self.is_bus_hotpluggable(bus)?;

        let mut slot = DeviceSlotInfo::new(b.accepted_device_types().to_vec());
        slot.hotpluggable = hotpluggable;
        slot.available = !b.is_full() && (!self.hotplug_only() || hotpluggable);
        slot.set_option("bus", b.name());
        Ok(slot)
    }

    /// 枚举一条总线的插槽：总线类型有专用枚举器时使用它，否则使用通用描述
    pub fn enumerate_bus_slots(&self, bus: BusId) -> QdevResult<Vec<DeviceSlotInfo>> {
        let enumerator = self.types().get(self.bus(bus)?.type_name())?.slot_enumerator();
        match enumerator {
            Some(enumerate) => enumerate(self, bus),
            None => Ok(vec![self.make_bus_slot(bus)?]),
        }
    }

    /// 查询总线子树中的全部插槽，合并后返回
    pub fn query_slots(&self, bus: BusId) -> QdevResult<Vec<DeviceSlotInfo>> {
        let mut list = Vec::new();
        for b in self.buses_in_subtree(bus)? {
            for slot in self.enumerate_bus_slots(b)? {
                add_slot(&mut list, slot);
            }
        }
        log::debug!(
            "Slot query of '{}' returned {} entries",
            self.node_label(bus.into()),
            list.len()
        );
        Ok(list)
    }

    /// 查询整棵树中的全部插槽
    pub fn query_all_slots(&self) -> QdevResult<Vec<DeviceSlotInfo>> {
        let mut list = Vec::new();
        for b in self.all_buses() {
            for slot in self.enumerate_bus_slots(b)? {
                add_slot(&mut list, slot);
            }
        }
        Ok(list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_set::SlotValue;
    use serde_json::json;

    fn ide_slot(bus: &str) -> DeviceSlotInfo {
        let mut slot = DeviceSlotInfo::new(vec!["ide-device".to_string()]);
        slot.available = true;
        slot.set_option("bus", bus);
        slot.set_option("unit", ValueSet::from_elements([0, 1]));
        slot
    }

    fn values(v: serde_json::Value) -> ValueSet {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn test_combine_single_mismatch() {
        let a = ide_slot("ide.0");
        let b = ide_slot("ide.1");
        assert_eq!(can_combine(&a, &b), Combinability::DiffersIn("bus".to_string()));

        let mut merged = a;
        assert!(try_combine(&mut merged, b).is_ok());
        assert_eq!(
            merged.option("bus").map(|o| o.values.clone()),
            Some(values(json!(["ide.0", "ide.1"])))
        );
    }

    #[test]
    fn test_differs_in_flag_and_option() {
        let a = ide_slot("ide.0");
        let mut b = ide_slot("ide.1");
        b.hotpluggable = true;
        assert_eq!(can_combine(&a, &b), Combinability::Incompatible);
    }

    #[test]
    fn test_identical_slots_add_counts() {
        let mut a = ide_slot("ide.0");
        a.count = Some(2);
        let mut b = ide_slot("ide.0");
        b.count = Some(3);
        assert_eq!(can_combine(&a, &b), Combinability::Identical);
        try_combine(&mut a, b).unwrap();
        assert_eq!(a.count, Some(5));
        assert_eq!(a.option("bus").map(|o| o.values.clone()), Some(ValueSet::from("ide.0")));
    }

    #[test]
    fn test_count_and_device_presence() {
        let a = ide_slot("ide.0");
        let mut b = ide_slot("ide.0");
        b.count = Some(1);
        assert_eq!(can_combine(&a, &b), Combinability::Incompatible);

        let mut c = ide_slot("ide.0");
        c.device = Some("/main-system-bus/ide/ide.0/disk0".to_string());
        assert_eq!(can_combine(&a, &c), Combinability::Incompatible);
        assert_eq!(can_combine(&c, &a), Combinability::Incompatible);

        // 同一设备路径的两个描述也不合并
        let d = c.clone();
        assert_eq!(can_combine(&c, &d), Combinability::Incompatible);
        let mut merged = c.clone();
        assert!(try_combine(&mut merged, d).is_err());
        assert_eq!(merged, c);
    }

    #[test]
    fn test_count_saturates_on_merge() {
        let mut a = ide_slot("ide.0");
        a.count = Some(u64::MAX);
        let mut b = ide_slot("ide.0");
        b.count = Some(u64::MAX);
        try_combine(&mut a, b).unwrap();
        assert_eq!(a.count, Some(u64::MAX));

        let mut list = Vec::new();
        for count in [u64::MAX - 1, 5] {
            let mut s = ide_slot("ide.1");
            s.count = Some(count);
            add_slot(&mut list, s);
        }
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].count, Some(u64::MAX));
    }

    #[test]
    fn test_new_options_are_prepended() {
        let mut a = DeviceSlotInfo::new(Vec::new());
        let mut b = DeviceSlotInfo::new(Vec::new());
        a.set_option("bus", "mybus.0");
        b.set_option("bus", "mybus.0");
        a.set_option("addr", values(json!([1, 3])));
        b.set_option("addr", SlotValue::from(5));
        a.set_option("unit", SlotValue::from(1));
        b.set_option("unit", SlotValue::from(1));

        try_combine(&mut a, b).unwrap();
        let names: Vec<&str> = a.opts.iter().map(|o| o.option.as_str()).collect();
        assert_eq!(names, ["unit", "addr", "bus"]);
        assert_eq!(a.opts[1].values, values(json!([1, 3, 5])));

        // 替换已有选项不改变位置
        a.set_option("addr", SlotValue::from(7));
        assert_eq!(a.opts[1], SlotOption::new("addr", SlotValue::from(7)));
    }

    #[test]
    fn test_option_combine_table() {
        let opts = |pairs: &[(&str, serde_json::Value)]| -> Vec<SlotOption> {
            pairs
                .iter()
                .map(|(name, v)| SlotOption::new(*name, values(v.clone())))
                .collect()
        };

        // 选项覆盖不对称
        assert_eq!(
            options_can_be_combined(&opts(&[("a", json!(1))]), &opts(&[("a", json!(1)), ("b", json!(2))])),
            Combinability::Incompatible
        );
        assert_eq!(
            options_can_be_combined(&opts(&[("a", json!(1)), ("b", json!(2))]), &opts(&[("a", json!(1))])),
            Combinability::Incompatible
        );
        // 顺序不同但取值相同
        assert_eq!(
            options_can_be_combined(
                &opts(&[("a", json!(1)), ("b", json!("x"))]),
                &opts(&[("b", json!("x")), ("a", json!(1))])
            ),
            Combinability::Identical
        );
        // 标量与单元素列表相等
        assert_eq!(
            options_can_be_combined(&opts(&[("a", json!(1))]), &opts(&[("a", json!([1]))])),
            Combinability::Identical
        );
        assert_eq!(
            options_can_be_combined(
                &opts(&[("a", json!(1)), ("b", json!(2))]),
                &opts(&[("a", json!(1)), ("b", json!(3))])
            ),
            Combinability::DiffersIn("b".to_string())
        );
        // 两个选项都不同
        assert_eq!(
            options_can_be_combined(
                &opts(&[("a", json!(1)), ("b", json!(2))]),
                &opts(&[("a", json!(5)), ("b", json!(3))])
            ),
            Combinability::Incompatible
        );
        // 区间与展开后的列表视为不同
        assert_eq!(
            options_can_be_combined(&opts(&[("a", json!([[1, 3]]))]), &opts(&[("a", json!([1, 2, 3]))])),
            Combinability::DiffersIn("a".to_string())
        );
    }

    #[test]
    fn test_add_slot_prepends_incompatible() {
        let mut list = Vec::new();
        let first = ide_slot("ide.0");
        let mut second = ide_slot("ide.1");
        second.available = false;

        add_slot(&mut list, first.clone());
        add_slot(&mut list, second.clone());
        assert_eq!(list, vec![second, first]);
    }

    #[test]
    fn test_add_slot_first_match_wins() {
        let slot = |bus: &str, unit: i64| {
            let mut s = ide_slot(bus);
            s.set_option("unit", SlotValue::from(unit));
            s
        };
        let mut list = Vec::new();
        add_slot(&mut list, slot("ide.0", 0));
        add_slot(&mut list, slot("ide.1", 1));
        assert_eq!(list.len(), 2);

        // 与两个条目都可合并，合并进列表中的第一个
        add_slot(&mut list, slot("ide.0", 1));
        assert_eq!(list.len(), 2);
        assert_eq!(
            list[0].option("bus").map(|o| o.values.clone()),
            Some(values(json!(["ide.1", "ide.0"])))
        );
        assert_eq!(list[1], slot("ide.0", 0));
    }

    #[test]
    fn test_serialized_shape() {
        let mut slot = ide_slot("ide.0");
        slot.count = Some(2);
        slot.set_option("unit", ValueSet::new(SlotValue::list([SlotValue::range(0, 1)])));
        let value = serde_json::to_value(&slot).unwrap();
        assert_eq!(
            value,
            json!({
                "device-types": ["ide-device"],
                "hotpluggable": false,
                "available": true,
                "count": 2,
                "opts-complete": true,
                "opts": [
                    {"option": "unit", "values": [[0, 1]]},
                    {"option": "bus", "values": "ide.0"},
                ],
            })
        );
        let back: DeviceSlotInfo = serde_json::from_value(value).unwrap();
        assert_eq!(back, slot);
    }
}
