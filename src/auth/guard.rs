use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

// 按客户端标识（通常是 IP）统计滑动窗口内的失败登录次数
pub struct LoginAttemptGuard {
    attempts: Mutex<HashMap<String, Vec<DateTime<Utc>>>>,
    max_attempts: usize,
    window: Duration,
}

impl LoginAttemptGuard {
    pub fn new(max_attempts: usize, window: Duration) -> Self {
        Self {
            attempts: Mutex::new(HashMap::new()),
            max_attempts,
            window,
        }
    }

    pub fn is_blocked(&self, client_id: &str) -> bool {
        self.is_blocked_at(client_id, Utc::now())
    }

    // 查询同时会清理窗口外的记录；被拦截不计入失败次数
    pub fn is_blocked_at(&self, client_id: &str, now: DateTime<Utc>) -> bool {
        let mut attempts = self.lock();
        let remaining = match attempts.get_mut(client_id) {
            Some(log) => {
                self.prune(log, now);
                log.len()
            }
            None => return false,
        };
        if remaining == 0 {
            attempts.remove(client_id);
        }
        remaining >= self.max_attempts
    }

    // 只追加，清理留给下一次 is_blocked
    pub fn record_failed_attempt(&self, client_id: &str) {
        self.record_failed_attempt_at(client_id, Utc::now());
    }

    pub fn record_failed_attempt_at(&self, client_id: &str, now: DateTime<Utc>) {
        self.lock()
            .entry(client_id.to_string())
            .or_default()
            .push(now);
    }

    // 登录成功后整条记录删除
    pub fn reset(&self, client_id: &str) {
        self.lock().remove(client_id);
    }

    pub fn attempt_count(&self, client_id: &str) -> usize {
        let now = Utc::now();
        self.lock()
            .get(client_id)
            .map(|log| log.iter().filter(|t| now - **t < self.window).count())
            .unwrap_or(0)
    }

    // 返回被移除的客户端数量
    pub fn cleanup(&self) -> usize {
        self.cleanup_at(Utc::now())
    }

    pub fn cleanup_at(&self, now: DateTime<Utc>) -> usize {
        let mut attempts = self.lock();
        let before = attempts.len();
        attempts.retain(|_, log| {
            self.prune(log, now);
            !log.is_empty()
        });
        before - attempts.len()
    }

    pub fn tracked_clients(&self) -> usize {
        self.lock().len()
    }

    fn prune(&self, log: &mut Vec<DateTime<Utc>>, now: DateTime<Utc>) {
        log.retain(|t| now - *t < self.window);
    }

    // 持锁期间不会 panic，被毒化的锁直接接管其中的数据
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<DateTime<Utc>>>> {
        self.attempts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
