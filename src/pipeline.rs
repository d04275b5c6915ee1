use crate::{
    engine::Engine,
    error::{Result, SimError},
    kernel::Kernel,
    texture::{Texture, TextureShape},
};

/// Index of a stage within its [`ShaderPipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StageId(usize);
impl StageId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Where a stage reads one of its inputs from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// The texture the pipeline is run on.
    Input,
    Stage(StageId),
}

#[derive(Debug, Clone)]
struct Stage {
    kernel: Kernel,
    qubits: u32,
    inputs: Vec<Source>,
    keep: bool,
}

/// A DAG of kernel invocations with declared sources and output sizes.
///
/// Running it releases every intermediate texture as soon as its last
/// reader has run, except for kept stages and the final stage.
#[derive(Debug, Clone, Default)]
pub struct ShaderPipeline {
    stages: Vec<Stage>,
}

/// The textures a pipeline run hands back.
#[derive(Debug)]
pub struct PipelineOutput {
    kept: Vec<(StageId, Texture)>,
    output: Texture,
}
impl PipelineOutput {
    /// The final stage's texture.
    pub fn output(&self) -> &Texture {
        &self.output
    }

    pub fn into_output(self) -> Texture {
        self.output
    }

    pub fn kept(&self, id: StageId) -> Option<&Texture> {
        self.kept.iter().find(|(i, _)| *i == id).map(|(_, t)| t)
    }

    pub fn take_kept(&mut self, id: StageId) -> Option<Texture> {
        let pos = self.kept.iter().position(|(i, _)| *i == id)?;
        Some(self.kept.swap_remove(pos).1)
    }
}

impl ShaderPipeline {
    pub fn new() -> Self {
        ShaderPipeline::default()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// The source the next [`ShaderPipeline::add_step`] will read.
    pub fn last(&self) -> Source {
        match self.stages.len() {
            0 => Source::Input,
            n => Source::Stage(StageId(n - 1)),
        }
    }

    /// Append a stage reading the previous stage (or the input).
    /// Kernels without inputs read nothing.
    pub fn add_step(&mut self, kernel: Kernel, qubits: u32) -> StageId {
        let inputs = match kernel.bindings().len() {
            0 => vec![],
            _ => vec![self.last()],
        };
        self.push(kernel, qubits, inputs, false)
    }

    /// Like [`ShaderPipeline::add_step`], but the output survives the run.
    pub fn add_kept_step(&mut self, kernel: Kernel, qubits: u32) -> StageId {
        let inputs = match kernel.bindings().len() {
            0 => vec![],
            _ => vec![self.last()],
        };
        self.push(kernel, qubits, inputs, true)
    }

    pub fn add_step_reading(&mut self, kernel: Kernel, qubits: u32, inputs: &[Source]) -> StageId {
        self.push(kernel, qubits, inputs.to_vec(), false)
    }

    /// Append every stage of `other`, feeding it this pipeline's last output.
    pub fn extend(&mut self, other: ShaderPipeline) {
        let base = self.stages.len();
        let feed = self.last();
        for mut stage in other.stages {
            for source in &mut stage.inputs {
                *source = match *source {
                    Source::Input => feed,
                    Source::Stage(StageId(i)) => Source::Stage(StageId(i + base)),
                };
            }
            self.stages.push(stage);
        }
    }

    fn push(&mut self, kernel: Kernel, qubits: u32, inputs: Vec<Source>, keep: bool) -> StageId {
        self.stages.push(Stage {
            kernel,
            qubits,
            inputs,
            keep,
        });
        StageId(self.stages.len() - 1)
    }

    /// Check every stage against its sources without running anything.
    /// Returns each stage's output shape.
    pub fn validate(&self, input: TextureShape) -> Result<Vec<TextureShape>> {
        if self.stages.is_empty() {
            return Err(SimError::EmptyPipeline);
        }
        let mut shapes: Vec<TextureShape> = Vec::with_capacity(self.stages.len());
        for (index, stage) in self.stages.iter().enumerate() {
            let inputs = stage
                .inputs
                .iter()
                .map(|source| match *source {
                    Source::Input => Ok(input),
                    Source::Stage(StageId(i)) => {
                        shapes.get(i).copied().ok_or(SimError::DanglingStageInput {
                            stage: index,
                            source_stage: i,
                        })
                    }
                })
                .collect::<Result<Vec<_>>>()?;
            shapes.push(stage.kernel.check(&inputs, stage.qubits)?);
        }
        Ok(shapes)
    }

    pub fn run(&self, engine: &Engine, input: &Texture) -> Result<PipelineOutput> {
        self.validate(input.shape())?;
        let last = self.stages.len() - 1;

        let mut readers = vec![0usize; self.stages.len()];
        for stage in &self.stages {
            for source in &stage.inputs {
                if let Source::Stage(StageId(i)) = *source {
                    readers[i] += 1;
                }
            }
        }

        let mut outputs: Vec<Option<Texture>> = (0..self.stages.len()).map(|_| None).collect();
        for (index, stage) in self.stages.iter().enumerate() {
            let texture = {
                let inputs = stage
                    .inputs
                    .iter()
                    .map(|source| match *source {
                        Source::Input => Ok(input),
                        Source::Stage(StageId(i)) => {
                            outputs[i].as_ref().ok_or(SimError::DanglingStageInput {
                                stage: index,
                                source_stage: i,
                            })
                        }
                    })
                    .collect::<Result<Vec<&Texture>>>()?;
                engine.render(&stage.kernel, &inputs, stage.qubits)?
            };

            let retained = stage.keep || index == last;
            if readers[index] > 0 || retained {
                outputs[index] = Some(texture);
            }
            for source in &stage.inputs {
                if let Source::Stage(StageId(i)) = *source {
                    readers[i] -= 1;
                    if readers[i] == 0 && !self.stages[i].keep && i != last {
                        outputs[i] = None;
                    }
                }
            }
        }

        let output = outputs[last].take().ok_or(SimError::EmptyPipeline)?;
        let kept = self
            .stages
            .iter()
            .enumerate()
            .filter(|(i, stage)| stage.keep && *i != last)
            .filter_map(|(i, _)| outputs[i].take().map(|t| (StageId(i), t)))
            .collect();
        Ok(PipelineOutput { kept, output })
    }
}
