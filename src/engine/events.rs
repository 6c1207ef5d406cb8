// ==========================================
// 仓库循环盘点系统 - 引擎层事件发布
// ==========================================
// 职责: 定义盘点事件发布 trait, 实现依赖倒置
// 说明: Engine 层定义 trait, 通知/看板层实现适配器;
//       引擎不依赖投递成功, 发布失败只记日志不影响操作结果
// ==========================================

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::sync::Arc;

// ==========================================
// 盘点事件类型
// ==========================================

/// 盘点事件触发类型
///
/// Engine 层定义的事件类型, 用于通知下游看板/提醒系统
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CountEventType {
    /// 盘点单被领取
    JournalClaimed,
    /// 盘点单被释放
    JournalReleased,
    /// 盘点单提交
    JournalSubmitted,
    /// 明细进入复盘
    RecountRequested,
    /// 盘点单审批通过
    JournalApproved,
    /// 盘点单整单驳回
    JournalRejected,
    /// 盘点单上报路由
    JournalEscalated,
    /// 盘点单完成调账
    JournalReconciled,
    /// 盘点计划关闭
    PlanClosed,
}

impl CountEventType {
    /// 转换为字符串标识
    pub fn as_str(&self) -> &str {
        match self {
            CountEventType::JournalClaimed => "JournalClaimed",
            CountEventType::JournalReleased => "JournalReleased",
            CountEventType::JournalSubmitted => "JournalSubmitted",
            CountEventType::RecountRequested => "RecountRequested",
            CountEventType::JournalApproved => "JournalApproved",
            CountEventType::JournalRejected => "JournalRejected",
            CountEventType::JournalEscalated => "JournalEscalated",
            CountEventType::JournalReconciled => "JournalReconciled",
            CountEventType::PlanClosed => "PlanClosed",
        }
    }
}

/// 盘点事件
///
/// Engine 层发布的不可变事件, 看板各自维护派生读模型,
/// 引擎内部不保留任何共享可变的看板状态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountEvent {
    /// 盘点单 ID (计划级事件为计划 ID)
    pub subject_id: String,
    /// 事件类型
    pub event_type: CountEventType,
    /// 触发人
    pub actor: Option<String>,
    /// 受影响的明细列表 (None 表示整单)
    pub affected_lines: Option<Vec<String>>,
    /// 事件补充说明
    pub detail: Option<String>,
}

impl CountEvent {
    /// 创建整单事件
    pub fn journal(subject_id: &str, event_type: CountEventType, actor: Option<&str>) -> Self {
        Self {
            subject_id: subject_id.to_string(),
            event_type,
            actor: actor.map(|s| s.to_string()),
            affected_lines: None,
            detail: None,
        }
    }

    /// 创建明细范围事件
    pub fn lines(
        subject_id: &str,
        event_type: CountEventType,
        actor: Option<&str>,
        lines: Vec<String>,
    ) -> Self {
        Self {
            affected_lines: Some(lines),
            ..Self::journal(subject_id, event_type, actor)
        }
    }

    /// 设置补充说明
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

// ==========================================
// 事件发布 Trait
// ==========================================

/// 盘点事件发布者 Trait
///
/// Engine 层定义, 通知/看板层实现
/// 通过 trait 实现依赖倒置, 解除引擎对下游的直接依赖
pub trait CountEventPublisher: Send + Sync {
    /// 发布盘点事件
    ///
    /// # 返回
    /// - `Ok(())`: 发布成功
    /// - `Err`: 发布失败 (调用方只记日志, 不影响业务操作)
    fn publish(&self, event: CountEvent) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// 空操作事件发布者
///
/// 用于不需要事件发布的场景 (如单元测试)
#[derive(Debug, Clone, Default)]
pub struct NoOpEventPublisher;

impl CountEventPublisher for NoOpEventPublisher {
    fn publish(&self, event: CountEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
        tracing::debug!(
            "NoOpEventPublisher: 跳过事件发布 - subject_id={}, event_type={}",
            event.subject_id,
            event.event_type.as_str()
        );
        Ok(())
    }
}

/// 可选的事件发布者包装
///
/// 简化 Option<Arc<dyn CountEventPublisher>> 的使用;
/// publish_or_log 吞掉投递失败, 保证业务操作不受影响
pub struct OptionalEventPublisher {
    inner: Option<Arc<dyn CountEventPublisher>>,
}

impl OptionalEventPublisher {
    /// 创建带发布者的实例
    pub fn with_publisher(publisher: Arc<dyn CountEventPublisher>) -> Self {
        Self {
            inner: Some(publisher),
        }
    }

    /// 创建空实例 (不发布事件)
    pub fn none() -> Self {
        Self { inner: None }
    }

    /// 发布事件, 失败只记告警日志
    pub fn publish_or_log(&self, event: CountEvent) {
        if let Some(publisher) = &self.inner {
            let event_type = event.event_type.as_str().to_string();
            let subject_id = event.subject_id.clone();
            if let Err(e) = publisher.publish(event) {
                tracing::warn!(
                    "事件发布失败 (不影响业务操作) - subject_id={}, event_type={}: {}",
                    subject_id,
                    event_type,
                    e
                );
            }
        }
    }

    /// 检查是否配置了发布者
    pub fn is_configured(&self) -> bool {
        self.inner.is_some()
    }
}

impl Default for OptionalEventPublisher {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingPublisher;

    impl CountEventPublisher for FailingPublisher {
        fn publish(&self, _event: CountEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
            Err("下游不可用".into())
        }
    }

    struct CountingPublisher {
        count: AtomicUsize,
    }

    impl CountEventPublisher for CountingPublisher {
        fn publish(&self, _event: CountEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_noop_publisher() {
        let publisher = NoOpEventPublisher;
        let event = CountEvent::journal("J1", CountEventType::JournalClaimed, Some("op01"));
        assert!(publisher.publish(event).is_ok());
    }

    #[test]
    fn test_optional_publisher_none() {
        let publisher = OptionalEventPublisher::none();
        assert!(!publisher.is_configured());

        // 无发布者时静默跳过
        publisher.publish_or_log(CountEvent::journal(
            "J1",
            CountEventType::JournalSubmitted,
            None,
        ));
    }

    #[test]
    fn test_optional_publisher_swallows_failure() {
        let publisher =
            OptionalEventPublisher::with_publisher(Arc::new(FailingPublisher));
        assert!(publisher.is_configured());

        // 发布失败不 panic、不返回错误
        publisher.publish_or_log(CountEvent::journal(
            "J1",
            CountEventType::JournalApproved,
            Some("sup01"),
        ));
    }

    #[test]
    fn test_optional_publisher_delivers() {
        let counting = Arc::new(CountingPublisher {
            count: AtomicUsize::new(0),
        });
        let publisher = OptionalEventPublisher::with_publisher(counting.clone());

        publisher.publish_or_log(
            CountEvent::lines(
                "J1",
                CountEventType::RecountRequested,
                Some("sup01"),
                vec!["L1".to_string()],
            )
            .with_detail("显著差异复盘"),
        );

        assert_eq!(counting.count.load(Ordering::SeqCst), 1);
    }
}
