//! 向量编码、余弦相似度与 top-k 收集

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::errors::{PrivalyticsError, Result};

/// 编码为小端 f32 字节序列
pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

pub fn decode_vector(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(PrivalyticsError::serialization(format!(
            "Vector blob length {} is not a multiple of 4",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// 余弦相似度；长度不一致或任一向量为零向量时返回 0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    dot_product / (magnitude_a * magnitude_b)
}

#[derive(Debug, Clone)]
struct Scored<T> {
    score: f32,
    /// 插入顺序，分数相同时先到者优先
    seq: u64,
    item: T,
}

impl<T> PartialEq for Scored<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for Scored<T> {}

impl<T> PartialOrd for Scored<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Scored<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// 固定容量的 top-k 收集器（小顶堆）
pub struct TopK<T> {
    k: usize,
    seq: u64,
    heap: BinaryHeap<Reverse<Scored<T>>>,
}

impl<T> TopK<T> {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            seq: 0,
            heap: BinaryHeap::with_capacity(k + 1),
        }
    }

    pub fn push(&mut self, score: f32, item: T) {
        if self.k == 0 || score.is_nan() {
            return;
        }
        self.heap.push(Reverse(Scored {
            score,
            seq: self.seq,
            item,
        }));
        self.seq += 1;
        if self.heap.len() > self.k {
            self.heap.pop();
        }
    }

    /// 按分数降序输出
    pub fn into_sorted(self) -> Vec<(T, f32)> {
        let mut entries: Vec<Scored<T>> = self.heap.into_iter().map(|Reverse(s)| s).collect();
        entries.sort_by(|a, b| b.cmp(a));
        entries.into_iter().map(|s| (s.item, s.score)).collect()
    }
}
