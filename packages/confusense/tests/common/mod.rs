#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use confusense::rephrase::{ProviderError, TextProvider};
use confusion_core::{Landmarks, Point, FACE_MESH_POINTS};

fn set_y(lm: &mut Landmarks, indices: &[usize], y: f64) {
    for &i in indices {
        let x = lm.get(i).map_or(0.0, |p| p.x);
        lm.set(i, Point::new(x, y));
    }
}

fn set_x(lm: &mut Landmarks, indices: &[usize], x: f64) {
    for &i in indices {
        let y = lm.get(i).map_or(0.0, |p| p.y);
        lm.set(i, Point::new(x, y));
    }
}

/// Relaxed face that scores 0 at full confidence.
pub fn neutral_face() -> Landmarks {
    let mut lm = Landmarks::new(vec![Some(Point::default()); FACE_MESH_POINTS]);

    // brows, eyes
    set_y(&mut lm, &[70, 63, 105, 296, 334, 293, 66, 107, 55, 300, 276, 285], 100.0);
    set_y(&mut lm, &[33, 7, 163, 362, 382, 381], 70.0);
    set_y(&mut lm, &[159, 158, 157, 173, 386, 385, 384, 398], 60.0);
    set_y(&mut lm, &[145, 153, 154, 155, 374, 373, 390, 249], 70.0);
    set_x(&mut lm, &[33, 7, 163], 100.0);
    set_x(&mut lm, &[144, 145, 153], 130.0);
    set_x(&mut lm, &[362, 382, 381], 200.0);
    set_x(&mut lm, &[380, 374, 373], 230.0);

    // mouth
    set_y(&mut lm, &[13, 82, 18, 17, 200], 200.0);
    set_y(&mut lm, &[14, 87, 178, 88, 95, 179], 205.0);
    lm.set(61, Point::new(140.0, 210.0));
    lm.set(291, Point::new(190.0, 210.0));

    // head
    lm.set(1, Point::new(165.0, 150.0));
    lm.set(168, Point::new(165.0, 60.0));
    lm.set(234, Point::new(90.0, 120.0));
    lm.set(454, Point::new(240.0, 120.0));
    set_y(&mut lm, &[10, 151, 9], 20.0);
    set_y(&mut lm, &[172, 136, 150, 149, 176], 180.0);
    lm
}

/// Inner brows lowered and slanted: raw score 0.65.
pub fn furrowed_face() -> Landmarks {
    let mut lm = neutral_face();
    set_y(&mut lm, &[70, 63, 105, 296, 334, 293], 80.0);
    lm
}

/// Provider double that answers with a fixed text and counts calls.
pub struct CountingProvider {
    pub reply: String,
    pub calls: Arc<AtomicUsize>,
    pub prompts: Arc<parking_lot::Mutex<Vec<String>>>,
}

impl CountingProvider {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            calls: Arc::new(AtomicUsize::new(0)),
            prompts: Arc::default(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextProvider for CountingProvider {
    fn name(&self) -> &'static str {
        "Counting"
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(prompt.to_string());
        Ok(self.reply.clone())
    }
}
