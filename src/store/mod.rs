//! 存储层
//!
//! `QuizStore` 是持久化的唯一契约：流水线对 Quiz 的每一次修改都
//! 必须通过 `try_transition` 的条件更新完成（读状态 → 校验迁移 →
//! 写入新状态 + 载荷修改，整体原子）。这保证了每个阶段的单写者语义，
//! 并发的预约尝试由这一个条件更新天然串行化，不需要外部锁管理器。

pub mod memory;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::question::Question;
use crate::models::quiz::Quiz;
use crate::models::status::QuizStatus;

pub use memory::InMemoryQuizStore;

/// 在迁移事务内对 Quiz 载荷做的修改
pub type QuizMutator = Box<dyn FnOnce(&mut Quiz) + Send>;

/// 条件更新的结果
#[derive(Debug)]
pub enum TransitionOutcome {
    /// 迁移合法，已写入；携带更新后的快照
    Applied(Quiz),
    /// 迁移不合法，什么都没改
    Rejected { from: QuizStatus, to: QuizStatus },
}

impl TransitionOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied(_))
    }
}

/// Quiz 持久化契约
#[async_trait]
pub trait QuizStore: Send + Sync {
    /// 写入新 Quiz
    async fn insert_quiz(&self, quiz: Quiz) -> AppResult<()>;

    /// 读取 Quiz 快照
    async fn get_quiz(&self, quiz_id: Uuid) -> AppResult<Quiz>;

    /// 条件状态更新（compare-and-swap + 载荷修改，单事务）
    ///
    /// 读当前状态，用迁移表校验 `current → to`；合法则执行 mutator、
    /// 写入新状态并返回快照；不合法则原样返回 `Rejected`，不产生任何副作用。
    async fn try_transition(
        &self,
        quiz_id: Uuid,
        to: QuizStatus,
        mutator: Option<QuizMutator>,
    ) -> AppResult<TransitionOutcome>;

    /// 阶段抢占（预约专用的条件更新）
    ///
    /// 和 `try_transition` 一样原子，但额外拒绝 `current == to` 的
    /// 自环：自环留给阶段内部写载荷用，抢占必须真正改变状态，
    /// 否则并发的两次预约会都成功。
    async fn try_claim(&self, quiz_id: Uuid, to: QuizStatus) -> AppResult<TransitionOutcome>;

    /// 批量写入生成的题目
    async fn insert_questions(&self, questions: Vec<Question>) -> AppResult<()>;

    /// Quiz 的全部题目
    async fn questions_for_quiz(&self, quiz_id: Uuid) -> AppResult<Vec<Question>>;

    /// Quiz 的已审核题目（导出只看这些）
    async fn approved_questions(&self, quiz_id: Uuid) -> AppResult<Vec<Question>>;

    /// 审核通过一道题（审核动作本身在编排核心之外，这里只提供写入口）
    async fn approve_question(&self, question_id: Uuid) -> AppResult<()>;
}
