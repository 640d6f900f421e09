/// # Summary
/// 固定容量的滚动环形缓冲区，承载实时图表的价格点。
///
/// # Invariants
/// - 内存空间在初始化时一次性分配，后续不再扩容。
/// - 始终保持最近 N 个元素，写满后覆盖最旧的元素。
/// - `cursor` 在写满后指向最旧元素所在的位置。
#[derive(Debug, Clone)]
pub struct RollingBuffer<T> {
    // 内部存储容器
    data: Vec<T>,
    // 最大容量
    capacity: usize,
    // 写满后的下一个覆盖位置
    cursor: usize,
}

impl<T: Clone> RollingBuffer<T> {
    /// # Summary
    /// 创建一个新的滚动缓冲区。
    ///
    /// # Arguments
    /// * `capacity`: 固定容量上限，至少为 1。
    ///
    /// # Returns
    /// 初始化后的 RollingBuffer 实例。
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            data: Vec::with_capacity(capacity),
            capacity,
            cursor: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// # Summary
    /// 向缓冲区推送新元素。
    ///
    /// # Logic
    /// 1. 若未满，则直接 push。
    /// 2. 若已满，则覆盖 cursor 处的最旧元素，并递增（取模）cursor。
    ///
    /// # Arguments
    /// * `item`: 待插入的元素。
    ///
    /// # Returns
    /// 被挤出的最旧元素 (若有)。
    pub fn push(&mut self, item: T) -> Option<T> {
        if self.data.len() < self.capacity {
            self.data.push(item);
            return None;
        }
        let evicted = self
            .data
            .get_mut(self.cursor)
            .map(|slot| std::mem::replace(slot, item));
        self.cursor = (self.cursor + 1) % self.capacity;
        evicted
    }

    // 最新元素在 data 中的下标
    fn last_index(&self) -> Option<usize> {
        if self.data.is_empty() {
            None
        } else if self.data.len() < self.capacity || self.cursor == 0 {
            Some(self.data.len() - 1)
        } else {
            Some(self.cursor - 1)
        }
    }

    /// 获取最新插入的元素。
    pub fn last(&self) -> Option<&T> {
        self.last_index().and_then(|i| self.data.get(i))
    }

    /// 获取最新插入元素的可变引用，用于在时间桶内原地更新。
    pub fn last_mut(&mut self) -> Option<&mut T> {
        self.last_index().and_then(|i| self.data.get_mut(i))
    }

    /// # Summary
    /// 仅保留满足条件的元素。
    ///
    /// # Logic
    /// 1. 先将环形存储按插入顺序展开为线性存储。
    /// 2. 在线性存储上过滤，并将 cursor 归零。
    ///
    /// # Arguments
    /// * `keep`: 保留条件。
    pub fn retain<F: FnMut(&T) -> bool>(&mut self, keep: F) {
        self.data.rotate_left(self.cursor);
        self.cursor = 0;
        self.data.retain(keep);
    }

    /// 清空缓冲区，保留已分配的内存。
    pub fn clear(&mut self) {
        self.data.clear();
        self.cursor = 0;
    }

    /// # Summary
    /// 获取按插入顺序排序的完整数据列表。
    ///
    /// # Logic
    /// 1. 若缓冲区未满，直接克隆整个 Vec。
    /// 2. 若已满，通过 cursor 切割并重组两段数据。
    ///
    /// # Returns
    /// 包含所有有效元素的有序 Vec 集合。
    pub fn to_vec(&self) -> Vec<T> {
        let mut result = Vec::with_capacity(self.data.len());
        result.extend(self.data[self.cursor..].iter().cloned());
        result.extend(self.data[..self.cursor].iter().cloned());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_evicts_oldest_when_full() {
        let mut buf = RollingBuffer::new(3);
        assert_eq!(buf.push(1), None);
        assert_eq!(buf.push(2), None);
        assert_eq!(buf.push(3), None);
        assert_eq!(buf.push(4), Some(1));
        assert_eq!(buf.push(5), Some(2));
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.to_vec(), vec![3, 4, 5]);
        assert_eq!(buf.last(), Some(&5));
    }

    #[test]
    fn test_last_mut_updates_newest_after_wrap() {
        let mut buf = RollingBuffer::new(2);
        buf.push(10);
        buf.push(20);
        buf.push(30);
        if let Some(last) = buf.last_mut() {
            *last += 1;
        }
        assert_eq!(buf.to_vec(), vec![20, 31]);
    }

    #[test]
    fn test_retain_keeps_order_after_wrap() {
        let mut buf = RollingBuffer::new(4);
        for i in 1..=6 {
            buf.push(i);
        }
        assert_eq!(buf.to_vec(), vec![3, 4, 5, 6]);
        buf.retain(|v| *v >= 5);
        assert_eq!(buf.to_vec(), vec![5, 6]);
        buf.push(7);
        assert_eq!(buf.to_vec(), vec![5, 6, 7]);
        assert_eq!(buf.last(), Some(&7));
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut buf = RollingBuffer::new(0);
        buf.push("a");
        buf.push("b");
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.to_vec(), vec!["b"]);
        buf.clear();
        assert!(buf.is_empty());
    }
}
