//! # Activation Layer Wrapper
use crate::models::resnet::graph::ActivationSpec;
use burn::nn::{Gelu, Relu, Sigmoid, Tanh};
use burn::prelude::{Backend, Module, Tensor};

impl ActivationSpec {
    /// Initialize a wrapped activation layer.
    pub fn init(&self) -> Activation {
        match self {
            ActivationSpec::Relu => Activation::Relu(Relu),
            ActivationSpec::Gelu => Activation::Gelu(Gelu),
            ActivationSpec::Sigmoid => Activation::Sigmoid(Sigmoid),
            ActivationSpec::Tanh => Activation::Tanh(Tanh),
        }
    }
}

/// Activation Layer Wrapper.
///
/// Stateless; one variant per [`ActivationSpec`].
#[derive(Module, Clone, Debug)]
pub enum Activation {
    /// [`Relu`] activation layer.
    Relu(Relu),

    /// [`Gelu`] activation layer.
    Gelu(Gelu),

    /// [`Sigmoid`] activation layer.
    Sigmoid(Sigmoid),

    /// [`Tanh`] activation layer.
    Tanh(Tanh),
}

impl Activation {
    /// Forward pass.
    pub fn forward<B: Backend, const D: usize>(
        &self,
        input: Tensor<B, D>,
    ) -> Tensor<B, D> {
        match self {
            Activation::Relu(layer) => layer.forward(input),
            Activation::Gelu(layer) => layer.forward(input),
            Activation::Sigmoid(layer) => layer.forward(input),
            Activation::Tanh(layer) => layer.forward(input),
        }
    }

    /// The descriptor this layer was built from.
    pub fn to_spec(&self) -> ActivationSpec {
        match self {
            Activation::Relu(_) => ActivationSpec::Relu,
            Activation::Gelu(_) => ActivationSpec::Gelu,
            Activation::Sigmoid(_) => ActivationSpec::Sigmoid,
            Activation::Tanh(_) => ActivationSpec::Tanh,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn make_input<B: Backend>(device: &B::Device) -> Tensor<B, 2> {
        Tensor::from_data([[-1.0, -0.5, 0.0], [1.0, 0.5, 0.0]], device)
    }

    fn check_spec_output<B: Backend, const D: usize>(
        spec: ActivationSpec,
        input: Tensor<B, D>,
        expected: Tensor<B, D>,
    ) {
        let act = spec.init();
        assert_eq!(act.to_spec(), spec);

        act.forward(input)
            .to_data()
            .assert_eq(&expected.to_data(), true);
    }

    #[test]
    fn test_relu() {
        let device = Default::default();
        let input = make_input::<TestBackend>(&device);
        let expected = Relu::default().forward(input.clone());
        check_spec_output(ActivationSpec::Relu, input, expected);
    }

    #[test]
    fn test_gelu() {
        let device = Default::default();
        let input = make_input::<TestBackend>(&device);
        let expected = Gelu::default().forward(input.clone());
        check_spec_output(ActivationSpec::Gelu, input, expected);
    }

    #[test]
    fn test_sigmoid() {
        let device = Default::default();
        let input = make_input::<TestBackend>(&device);
        let expected = Sigmoid::default().forward(input.clone());
        check_spec_output(ActivationSpec::Sigmoid, input, expected);
    }

    #[test]
    fn test_tanh() {
        let device = Default::default();
        let input = make_input::<TestBackend>(&device);
        let expected = Tanh::default().forward(input.clone());
        check_spec_output(ActivationSpec::Tanh, input, expected);
    }
}
