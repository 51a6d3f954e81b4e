use super::linear::Linear;
use crate::config::GptConfig;
use crate::funcs::Gelu;
use crate::graph::{Graph, GraphError, TensorId};
use rand::Rng;

/// Position-wise feed-forward network: `C -> 4C`, GELU, `4C -> C`.
#[derive(Debug, Clone)]
pub struct Mlp {
    pub c_fc: Linear,
    pub c_proj: Linear,
}

impl Mlp {
    pub fn new<R: Rng>(
        g: &mut Graph,
        rng: &mut R,
        name: &str,
        config: &GptConfig,
        std: f32,
    ) -> Result<Self, GraphError> {
        let c = config.embedding_degree();
        Ok(Self {
            c_fc: Linear::new(g, rng, &format!("{}.c_fc", name), c, 4 * c, std)?,
            c_proj: Linear::new(
                g,
                rng,
                &format!("{}.c_proj", name),
                4 * c,
                c,
                std * config.residual_scale(),
            )?,
        })
    }

    pub fn forward(&self, g: &mut Graph, inp: TensorId) -> Result<TensorId, GraphError> {
        let hidden = self.c_fc.forward(g, inp)?;
        let activated = g.call(Gelu::new(), &[hidden])?;
        self.c_proj.forward(g, activated)
    }

    pub fn params(&self) -> Vec<TensorId> {
        [self.c_fc.params(), self.c_proj.params()].concat()
    }
}
